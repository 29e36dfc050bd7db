//! Embedding backend implementations

use crate::config::Settings;
use crate::embedding::{normalize_embedding, Embedder, Embedding};
use crate::error::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub mod candle_bert;

pub use candle_bert::CandleBertEmbedder;

/// Dimension of the hashing embedder; matches MiniLM so indexes look alike
pub const TOKEN_EMBEDDER_DIMENSION: usize = 384;

/// Bag-of-tokens embedder using feature hashing
///
/// Needs no model download; used for offline runs and tests.
pub struct TokenEmbedder {
    model_name: String,
    dimension: usize,
}

impl TokenEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model_name: format!("token-hash-{}", dimension),
            dimension,
        }
    }

    fn generate_embedding(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0; self.dimension];

        let tokens: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|s| !s.is_empty())
            .collect();

        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dimension;
            embedding[idx] += 1.0;
        }

        normalize_embedding(&mut embedding);
        embedding
    }
}

impl Default for TokenEmbedder {
    fn default() -> Self {
        Self::new(TOKEN_EMBEDDER_DIMENSION)
    }
}

impl Embedder for TokenEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Embedding> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Embedding>> {
        Ok(texts.iter().map(|&text| self.generate_embedding(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Create the embedder named by `EMBEDDING_BACKEND`
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match settings.embedding_backend.trim().to_lowercase().as_str() {
        "candle" | "bert" => {
            let embedder = CandleBertEmbedder::new(
                &settings.embedding_model,
                settings.cache_dir.as_deref(),
            )
            .map_err(Error::Embedding)?;
            Ok(Arc::new(embedder))
        }
        "token" => Ok(Arc::new(TokenEmbedder::default())),
        other => Err(Error::config(
            "EMBEDDING_BACKEND",
            format!("unknown embedding backend '{}'. Valid options: candle, token", other),
        )),
    }
}
