//! Tokenizer wrapper for HuggingFace tokenizers
//!
//! Shared by the generator (chat models) and the BERT embedder.

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Tokens that end a chat turn across the supported model families
pub const STOP_TOKENS: [&str; 3] = ["<|im_end|>", "<|endoftext|>", "</s>"];

/// Wrapper around HuggingFace tokenizer
#[derive(Clone)]
pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl TokenizerWrapper {
    /// Load tokenizer from a tokenizer.json file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        Ok(Self {
            tokenizer,
            max_length: 512,
        })
    }

    /// Set maximum sequence length used for batch truncation
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Encode a single text without truncation
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<EncodedInput> {
        let encoding = self
            .tokenizer
            .encode(text, add_special_tokens)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        Ok(EncodedInput {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            token_type_ids: encoding.get_type_ids().to_vec(),
        })
    }

    /// Encode a batch of texts, padded to the longest and truncated to
    /// `max_length`
    pub fn encode_batch(&self, texts: &[String], add_special_tokens: bool) -> Result<BatchEncodedInput> {
        let mut tokenizer = self.tokenizer.clone();
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to set truncation: {}", e))?;

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), add_special_tokens)
            .map_err(|e| anyhow::anyhow!("Batch tokenization failed: {}", e))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            input_ids.extend(encoding.get_ids());
            attention_mask.extend(encoding.get_attention_mask());
            token_type_ids.extend(encoding.get_type_ids());
        }

        Ok(BatchEncodedInput {
            input_ids,
            attention_mask,
            token_type_ids,
            batch_size,
            seq_len,
        })
    }

    /// Decode token IDs back to text
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// IDs of the end-of-turn tokens this vocabulary knows about
    pub fn stop_token_ids(&self) -> Vec<u32> {
        STOP_TOKENS
            .iter()
            .filter_map(|t| self.token_to_id(t))
            .collect()
    }
}

/// Encoded input for a single text
#[derive(Debug, Clone)]
pub struct EncodedInput {
    pub input_ids: Vec<u32>,
    /// 1 for real tokens, 0 for padding
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
}

/// Batch encoded input, flattened row-major
#[derive(Debug, Clone)]
pub struct BatchEncodedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub batch_size: usize,
    /// Sequence length after padding
    pub seq_len: usize,
}

impl BatchEncodedInput {
    /// Input IDs, token type IDs and attention mask as `[batch, seq]` tensors
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
        let shape = (self.batch_size, self.seq_len);
        let input_ids = Tensor::new(&self.input_ids[..], device)?.reshape(shape)?;
        let token_type_ids = Tensor::new(&self.token_type_ids[..], device)?.reshape(shape)?;
        let attention_mask = Tensor::new(&self.attention_mask[..], device)?
            .to_dtype(DType::F32)?
            .reshape(shape)?;

        Ok((input_ids, token_type_ids, attention_mask))
    }
}
