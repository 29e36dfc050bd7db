//! Compiler-optimized runtime backend (ONNX Runtime)
//!
//! Runs an exported causal-LM graph with full graph optimization. The graph
//! takes `input_ids` and `attention_mask` (i64, `[1, seq]`) and returns logits
//! `[1, seq, vocab]`; it is re-fed the whole sequence each step.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use onnxruntime::ndarray::Array2;
use onnxruntime::tensor::OrtOwnedTensor;
use onnxruntime::{environment::Environment, session::Session, GraphOptimizationLevel, LoggingLevel};
use std::path::Path;

/// Process-wide runtime environment; `Err` when the runtime cannot start
static ONNX_ENVIRONMENT: Lazy<std::result::Result<Environment, String>> = Lazy::new(|| {
    Environment::builder()
        .with_name("kbqa")
        .with_log_level(LoggingLevel::Warning)
        .build()
        .map_err(|e| e.to_string())
});

/// Whether the runtime environment initializes in this process
pub fn runtime_available() -> bool {
    match &*ONNX_ENVIRONMENT {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("ONNX Runtime unavailable: {}", e);
            false
        }
    }
}

/// Causal LM session
pub struct OnnxCausalLm {
    session: Session<'static>,
}

// The session is only reached through the generator's mutex.
unsafe impl Send for OnnxCausalLm {}

impl OnnxCausalLm {
    pub fn load(model_path: &Path, device_hint: &str) -> Result<Self> {
        let environment = ONNX_ENVIRONMENT
            .as_ref()
            .map_err(|e| anyhow!("ONNX Runtime environment failed to start: {}", e))?;

        tracing::info!("Loading ONNX graph from {:?}", model_path);
        if !device_hint.eq_ignore_ascii_case("cpu") {
            tracing::warn!(
                "Device hint '{}' has no wired execution provider; using CPU",
                device_hint
            );
        }

        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let session = environment
            .new_session_builder()?
            .with_optimization_level(GraphOptimizationLevel::All)?
            .with_number_threads(threads as i16)?
            .with_model_from_file(model_path)
            .with_context(|| format!("Failed to build session for {:?}", model_path))?;

        Ok(Self { session })
    }

    /// Logits for the token following `tokens`
    pub fn next_logits(&mut self, tokens: &[u32]) -> Result<Vec<f32>> {
        let seq_len = tokens.len();
        let input_ids = Array2::from_shape_vec(
            (1, seq_len),
            tokens.iter().map(|&t| t as i64).collect(),
        )?;
        let attention_mask = Array2::<i64>::ones((1, seq_len));

        let outputs: Vec<OrtOwnedTensor<f32, _>> = self
            .session
            .run(vec![input_ids.into_dyn(), attention_mask.into_dyn()])?;
        let logits = outputs
            .first()
            .ok_or_else(|| anyhow!("ONNX graph produced no outputs"))?;

        let vocab = *logits
            .shape()
            .last()
            .ok_or_else(|| anyhow!("ONNX logits have no dimensions"))?;
        let flat: Vec<f32> = logits.iter().copied().collect();
        if vocab == 0 || flat.len() < vocab {
            anyhow::bail!("Unexpected ONNX logits shape {:?}", logits.shape());
        }
        Ok(flat[flat.len() - vocab..].to_vec())
    }
}
