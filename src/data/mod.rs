//! Knowledge-base documents
//!
//! A document is one whole file: no chunking, no front-matter parsing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loaders;

pub use loaders::*;

/// A loaded knowledge-base file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Path the text was read from
    pub source: PathBuf,
    /// Full file body
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Metadata for a document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    /// File type (txt, md)
    pub file_type: String,
    /// File size in bytes
    pub size: usize,
    /// Bytes that were not valid UTF-8 were replaced
    pub lossy: bool,
}

impl Document {
    pub fn new(source: PathBuf, text: String, metadata: DocumentMetadata) -> Self {
        Self {
            source,
            text,
            metadata,
        }
    }

    /// Text with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Whether nothing but whitespace was read
    pub fn is_blank(&self) -> bool {
        self.trimmed().is_empty()
    }

    /// Source path as stored in the index
    pub fn source_key(&self) -> String {
        self.source.to_string_lossy().to_string()
    }
}
