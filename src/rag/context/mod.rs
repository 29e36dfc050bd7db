//! Prompt assembly for RAG generation

mod templates;

pub use templates::{PromptAssembler, ASSISTANT_HEADER, IM_END, IM_START, SNIPPET_SEPARATOR};
