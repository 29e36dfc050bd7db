//! Error kinds surfaced at the library boundary
//!
//! Internals use `anyhow` with context; every public entry point maps its
//! failure onto one of these variants so callers can tell a fatal model or
//! index failure apart from conditions that only degrade behaviour.

use std::path::PathBuf;

use thiserror::Error;

/// Crate error type
#[derive(Debug, Error)]
pub enum Error {
    /// A setting is present but unusable by the component consuming it
    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    /// An explicitly requested backend cannot be used; the selector degrades
    /// instead of returning this
    #[error("backend '{requested}' unavailable: {reason}")]
    BackendUnavailable { requested: String, reason: String },

    /// Tokenizer or model construction failed for the chosen backend
    #[error("failed to load model: {0:#}")]
    ModelLoad(#[source] anyhow::Error),

    /// A single knowledge-base file could not be read
    #[error("failed to read {path:?}: {source}")]
    Ingestion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing usable was found to ingest
    #[error("no usable documents found under {0:?}")]
    EmptyKnowledgeBase(PathBuf),

    /// The vector index could not be opened, read or written
    #[error("vector store error: {0:#}")]
    VectorStore(#[source] anyhow::Error),

    /// The embedding model failed to load or to embed
    #[error("embedding error: {0:#}")]
    Embedding(#[source] anyhow::Error),

    /// A generation call on the loaded pipeline failed
    #[error("generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),
}

impl Error {
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Whether the surrounding application should treat this as fatal for
    /// the current request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad(_)
                | Self::VectorStore(_)
                | Self::Embedding(_)
                | Self::Generation(_)
                | Self::Config { .. }
        )
    }
}

/// Result alias used across the public API
pub type Result<T> = std::result::Result<T, Error>;
