//! # kbqa
//!
//! Knowledge-base question answering on a locally hosted model.
//!
//! ## Overview
//!
//! Two halves share the persisted vector index:
//!
//! - Ingestion reads a directory of text and Markdown files, embeds each
//!   non-empty file and upserts it into the index.
//! - Answering retrieves the closest snippets for a question, renders a
//!   ChatML prompt and runs it through a generation pipeline that is loaded
//!   once per process on the best backend the machine offers.
//!
//! ## Architecture
//!
//! - `config` - Settings resolved from the environment
//! - `backend` - Capability probes and backend selection with fallback
//! - `hub` - Model artifact resolution (local directory or HuggingFace Hub)
//! - `tokenizer` - Tokenizer handle shared by generator and embedder
//! - `generator` - Model loading and the decode loop
//! - `cache` - Lazily initialized pipeline and system prompt
//! - `data` - Document discovery and loading
//! - `embedding` - Text embedders
//! - `index` - SQLite vector index
//! - `retrieval` - HNSW retriever over the index
//! - `ingest` - Ingestion pipeline
//! - `rag` - Prompt assembly and the retrieval chain
//! - `cli` - Command-line interface

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod hub;
pub mod index;
pub mod ingest;
pub mod rag;
pub mod retrieval;
pub mod tokenizer;

pub use error::{Error, Result};
