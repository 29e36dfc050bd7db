//! Retrieval over the persisted vector index
//!
//! The query path depends only on [`Retriever`]: given a question, return an
//! ordered list of snippets with their source paths.

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub mod dense;

pub use dense::{HnswConfig, HnswRetriever};

/// One retrieved snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source path of the indexed document
    pub source: String,
    /// Indexed text
    pub text: String,
    /// Relevance score (higher is better)
    pub score: f32,
    /// Rank in the result list (1-indexed)
    pub rank: usize,
}

/// Trait for retrieval engines
pub trait Retriever: Send + Sync {
    /// Retrieve the top-k most relevant snippets for a query, best first
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>>;

    /// Get the name of this retriever
    fn name(&self) -> &str;
}
