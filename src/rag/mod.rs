//! Retrieval-augmented answering
//!
//! ```text
//! question
//!     │
//!     ▼
//! ┌─────────────┐
//! │  Retriever  │  ← HNSW over the persisted index
//! └─────────────┘
//!     │
//!     ▼ SearchResults
//! ┌─────────────┐
//! │   Prompt    │  ← system prompt + joined snippets + question
//! │  Assembler  │
//! └─────────────┘
//!     │
//!     ▼ ChatML prompt
//! ┌─────────────┐
//! │  Pipeline   │  ← lazily loaded via PipelineCache
//! └─────────────┘
//!     │
//!     ▼
//! ChainResult (continuation + sources)
//! ```

pub mod chain;
pub mod context;
pub mod query;

pub use chain::{extract_continuation, RetrievalChain};
pub use context::PromptAssembler;
pub use query::{ChainResult, Source};
