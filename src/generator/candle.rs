//! Local decoder generation
//!
//! One decode loop serves every backend: the model variant only decides how
//! the next-token logits are computed.

use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::qwen2::ModelForCausalLM as Qwen2Model;
#[cfg(feature = "quantized")]
use candle_transformers::models::quantized_qwen2::ModelWeights as QuantizedQwen2;
use std::sync::Mutex;

use super::{GenerationProfile, Generator};
use crate::tokenizer::TokenizerWrapper;

/// Loaded model weights, one variant per backend strategy
pub enum GeneratorModel {
    /// Safetensors weights at f32 (CPU) or reduced precision (device-mapped)
    Qwen2(Qwen2Model),
    /// 4-bit GGUF weights
    #[cfg(feature = "quantized")]
    Quantized(QuantizedQwen2),
    /// Exported graph on the compiler-optimized runtime
    #[cfg(feature = "onnx")]
    Onnx(super::onnx::OnnxCausalLm),
}

impl GeneratorModel {
    /// Logits for the token following `tokens`, as a 1-D f32 tensor
    ///
    /// `pos` is the number of tokens already in the KV cache.
    fn next_logits(&mut self, tokens: &[u32], pos: usize, device: &Device) -> Result<Tensor> {
        match self {
            Self::Qwen2(model) => {
                let input = Tensor::new(&tokens[pos..], device)?.unsqueeze(0)?;
                last_token_logits(&model.forward(&input, pos)?)
            }
            #[cfg(feature = "quantized")]
            Self::Quantized(model) => {
                // index_pos 0 replaces the per-layer cache
                let input = Tensor::new(&tokens[pos..], device)?.unsqueeze(0)?;
                last_token_logits(&model.forward(&input, pos)?)
            }
            #[cfg(feature = "onnx")]
            Self::Onnx(model) => {
                let logits = model.next_logits(tokens)?;
                let vocab = logits.len();
                Ok(Tensor::from_vec(logits, vocab, &Device::Cpu)?)
            }
        }
    }

    fn reset(&mut self) {
        if let Self::Qwen2(model) = self {
            model.clear_kv_cache();
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Qwen2(_) => "qwen2",
            #[cfg(feature = "quantized")]
            Self::Quantized(_) => "qwen2-gguf",
            #[cfg(feature = "onnx")]
            Self::Onnx(_) => "qwen2-onnx",
        }
    }
}

/// Flatten `[.., seq, vocab]` logits and keep the last row
fn last_token_logits(logits: &Tensor) -> Result<Tensor> {
    let vocab = logits.dim(D::Minus1)?;
    let rows = logits.reshape(((), vocab))?;
    let last = rows.get(rows.dim(0)? - 1)?;
    Ok(last.to_dtype(DType::F32)?)
}

/// Generator over a locally loaded model
pub struct LocalGenerator {
    /// Held for a whole generation: the KV cache belongs to one sequence
    model: Mutex<GeneratorModel>,
    tokenizer: TokenizerWrapper,
    device: Device,
    model_name: String,
    stop_token_ids: Vec<u32>,
}

impl LocalGenerator {
    pub fn new(
        model: GeneratorModel,
        tokenizer: TokenizerWrapper,
        device: Device,
        model_name: &str,
    ) -> Self {
        let stop_token_ids = tokenizer.stop_token_ids();
        if stop_token_ids.is_empty() {
            tracing::warn!(
                "No end-of-turn token in the vocabulary of {}; generation stops at max_new_tokens",
                model_name
            );
        }
        tracing::debug!("{} ready ({}), stop tokens {:?}", model_name, model.kind(), stop_token_ids);

        Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            model_name: model_name.to_string(),
            stop_token_ids,
        }
    }

    fn generate_internal(&self, prompt: &str, profile: &GenerationProfile) -> Result<String> {
        let prompt_tokens = self.tokenizer.encode(prompt, true)?.input_ids;
        let prompt_len = prompt_tokens.len();
        if prompt_len == 0 {
            anyhow::bail!("Empty prompt after tokenization");
        }

        let mut logits_processor = LogitsProcessor::new(
            profile.seed,
            profile.sampling_temperature(),
            profile.sampling_top_p(),
        );

        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Model lock poisoned: {}", e))?;
        model.reset();

        let mut all_tokens = prompt_tokens;
        let mut pos = 0;
        for _ in 0..profile.max_new_tokens {
            let logits = model.next_logits(&all_tokens, pos, &self.device)?;
            let logits = if profile.repetition_penalty != 1.0 {
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    profile.repetition_penalty,
                    &all_tokens,
                )?
            } else {
                logits
            };

            let next_token = logits_processor.sample(&logits)?;
            pos = all_tokens.len();
            all_tokens.push(next_token);

            if self.stop_token_ids.contains(&next_token) {
                tracing::debug!("Generation stopped: end-of-turn token");
                break;
            }
        }
        drop(model);

        let generated = &all_tokens[prompt_len..];
        tracing::debug!("Generated {} tokens", generated.len());
        let continuation = self.tokenizer.decode(generated, true)?;

        Ok(if profile.return_full_text {
            format!("{}{}", prompt, continuation)
        } else {
            continuation
        })
    }
}

impl Generator for LocalGenerator {
    fn generate(&self, prompt: &str, profile: &GenerationProfile) -> Result<String> {
        self.generate_internal(prompt, profile)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
