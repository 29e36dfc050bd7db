//! Dense retrieval using HNSW
//!
//! The graph is rebuilt in memory from a snapshot of the SQLite index when
//! the retriever is constructed. Entries written afterwards are not visible
//! until a new retriever is built.

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::{IndexMetadata, VectorIndex, VectorIndexEntry};
use crate::retrieval::{Retriever, SearchResult};
use hnsw_rs::hnsw::{Hnsw, Neighbour};
use hnsw_rs::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Configuration for HNSW index
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Maximum number of connections per layer (default: 16)
    pub max_connections: usize,
    /// Size of the dynamic candidate list (default: 200)
    pub ef_construction: usize,
    /// Maximum number of layers (default: 16)
    pub max_layers: usize,
    /// Candidate list size at query time (default: 30)
    pub ef_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            max_layers: 16,
            ef_search: 30,
        }
    }
}

/// Dense retriever using HNSW for approximate nearest neighbor search
pub struct HnswRetriever {
    /// `None` when the index holds no entries
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    /// Point id is the position in this list
    entries: Vec<VectorIndexEntry>,
    embedder: Arc<dyn Embedder>,
    config: HnswConfig,
}

impl HnswRetriever {
    /// Build from entries already in memory
    pub fn build(
        entries: Vec<VectorIndexEntry>,
        embedder: Arc<dyn Embedder>,
        config: HnswConfig,
    ) -> Result<Self> {
        let dimension = embedder.dimension();
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(Error::VectorStore(anyhow::anyhow!(
                "entry {} has dimension {}, embedder {} produces {}",
                bad.source,
                bad.embedding.len(),
                embedder.model_name(),
                dimension
            )));
        }

        let hnsw = if entries.is_empty() {
            None
        } else {
            tracing::debug!(
                "Building HNSW index: {} entries, {} dimensions",
                entries.len(),
                dimension
            );
            let hnsw: Hnsw<f32, DistCosine> = Hnsw::new(
                config.max_connections,
                entries.len(),
                config.max_layers,
                config.ef_construction,
                DistCosine,
            );
            for (point_id, entry) in entries.iter().enumerate() {
                hnsw.insert((entry.embedding.as_slice(), point_id));
            }
            Some(hnsw)
        };

        Ok(Self {
            hnsw,
            entries,
            embedder,
            config,
        })
    }

    /// Load a snapshot of the index persisted under `index_dir`
    ///
    /// A missing index gives an empty retriever.
    pub fn from_index(index_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let Some(index) = VectorIndex::open(index_dir)? else {
            tracing::warn!("No vector index at {:?}; retrieval will return nothing", index_dir);
            return Self::build(Vec::new(), embedder, HnswConfig::default());
        };

        if let Some(IndexMetadata { model_name, .. }) = index.metadata()? {
            if model_name != embedder.model_name() {
                tracing::warn!(
                    "Embedder model mismatch: index={}, embedder={}",
                    model_name,
                    embedder.model_name()
                );
            }
        }

        let entries = index.entries()?;
        tracing::info!("Loaded {} entries from {:?}", entries.len(), index.path());
        Self::build(entries, embedder, HnswConfig::default())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Retriever for HnswRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let Some(hnsw) = &self.hnsw else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .map_err(|e| Error::Embedding(e.context("Failed to embed query")))?;

        let neighbors: Vec<Neighbour> = hnsw.search(
            query_embedding.as_slice(),
            top_k,
            self.config.ef_search.max(top_k),
        );

        let results = neighbors
            .iter()
            .filter_map(|n| self.entries.get(n.d_id).map(|entry| (entry, n.distance)))
            .enumerate()
            .map(|(rank, (entry, distance))| SearchResult {
                source: entry.source.clone(),
                text: entry.text.clone(),
                // hnsw_rs returns cosine distance
                score: 1.0 - distance,
                rank: rank + 1,
            })
            .collect();

        Ok(results)
    }

    fn name(&self) -> &str {
        "hnsw"
    }
}
