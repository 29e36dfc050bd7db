//! Generation profile
//!
//! The loaded pipeline runs with one fixed profile; callers cannot tune
//! sampling per request.

use serde::{Deserialize, Serialize};

/// Sampling and output settings bound to a loaded pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProfile {
    /// Maximum new tokens to generate
    pub max_new_tokens: usize,

    /// Temperature (0.0 = greedy)
    pub temperature: f64,

    /// Top-p (nucleus sampling) cumulative probability threshold
    pub top_p: f64,

    /// Repetition penalty over prompt and generated tokens (1.0 = none)
    pub repetition_penalty: f32,

    /// Output starts with the prompt, followed by the continuation
    pub return_full_text: bool,

    /// Sampler seed
    pub seed: u64,
}

impl Default for GenerationProfile {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.1,
            return_full_text: true,
            seed: 42,
        }
    }
}

impl GenerationProfile {
    /// Temperature as the sampler expects it
    pub fn sampling_temperature(&self) -> Option<f64> {
        (self.temperature > 0.0).then_some(self.temperature)
    }

    /// Top-p as the sampler expects it
    pub fn sampling_top_p(&self) -> Option<f64> {
        (self.top_p < 1.0).then_some(self.top_p)
    }
}
