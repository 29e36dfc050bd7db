//! Candle BERT sentence embedder
//!
//! Sentence-transformers style: BERT encoder, mean pooling over the attention
//! mask, L2 normalization. Always runs on CPU, as the embedding model is
//! small and shares the process with the generator.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::path::Path;

use crate::embedding::{Embedder, Embedding};
use crate::hub::HubApi;
use crate::tokenizer::TokenizerWrapper;

/// Truncation length for sentence-transformers MiniLM checkpoints
const MAX_SEQ_LENGTH: usize = 256;
const BATCH_SIZE: usize = 16;

#[derive(serde::Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

/// BERT-family embedder loaded from the Hub or a local directory
pub struct CandleBertEmbedder {
    model: BertModel,
    tokenizer: TokenizerWrapper,
    device: Device,
    model_id: String,
    hidden_size: usize,
}

impl CandleBertEmbedder {
    pub fn new(model_id: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let device = Device::Cpu;
        tracing::info!("Loading embedding model: {}", model_id);

        let hub = HubApi::new(cache_dir)?;
        let tokenizer = TokenizerWrapper::from_file(hub.tokenizer_file(model_id)?)
            .context("Failed to load embedding tokenizer")?
            .with_max_length(MAX_SEQ_LENGTH);

        let files = hub.model_files(model_id)?;
        let config_str = std::fs::read_to_string(&files.config_file)
            .context("Failed to read embedding model config")?;
        let config: BertConfig =
            serde_json::from_str(&config_str).context("Failed to parse BERT config")?;
        let dims: HiddenSize =
            serde_json::from_str(&config_str).context("Failed to parse BERT config")?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&files.weight_files, DType::F32, &device)
                .context("Failed to load embedding weights")?
        };
        let model = BertModel::load(vb, &config).context("Failed to create BERT model")?;

        tracing::info!("Embedding model loaded (dim={})", dims.hidden_size);

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            hidden_size: dims.hidden_size,
        })
    }

    /// Embed one batch as a `[batch, hidden]` tensor
    fn embed_batch_tensor(&self, texts: &[&str]) -> Result<Tensor> {
        let owned: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        let batch = self.tokenizer.encode_batch(&owned, true)?;
        let (input_ids, token_type_ids, attention_mask) = batch.to_tensors(&self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = mean_pool(&hidden, &attention_mask)?;
        normalize_rows(&pooled)
    }
}

/// Mean pooling over non-padding tokens
fn mean_pool(hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.unsqueeze(2)?.to_dtype(hidden_states.dtype())?;
    let sum = hidden_states.broadcast_mul(&mask)?.sum(1)?;
    let count = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(sum.broadcast_div(&count)?)
}

/// Normalize each row to unit length
fn normalize_rows(embeddings: &Tensor) -> Result<Tensor> {
    let norm = embeddings.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?;
    Ok(embeddings.broadcast_div(&norm.clamp(1e-12, f64::MAX)?)?)
}

impl Embedder for CandleBertEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let tensor = self.embed_batch_tensor(&[text])?;
        Ok(tensor.get(0)?.to_vec1()?)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let batch_tensor = self.embed_batch_tensor(chunk)?;
            all_embeddings.extend(batch_tensor.to_vec2::<f32>()?);
        }
        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.hidden_size
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
