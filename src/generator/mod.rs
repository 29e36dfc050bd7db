//! Text generation: model loading and the loaded pipeline
//!
//! [`ModelLoader`] turns a [`BackendDecision`] into a [`LoadedPipeline`]: a
//! tokenizer-bound generation callable plus the fixed [`GenerationProfile`].

pub mod candle;
pub mod config;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use candle::LocalGenerator;
pub use config::GenerationProfile;
pub use loader::ModelLoader;

use crate::backend::BackendDecision;
use crate::error::{Error, Result};

/// Trait for text generation models
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`
    ///
    /// With `profile.return_full_text` the returned text is the prompt
    /// followed by the continuation.
    fn generate(&self, prompt: &str, profile: &GenerationProfile) -> anyhow::Result<String>;

    /// Model name/identifier
    fn model_name(&self) -> &str;
}

/// A ready-to-call generation pipeline
pub struct LoadedPipeline {
    generator: Box<dyn Generator>,
    decision: BackendDecision,
    profile: GenerationProfile,
}

impl LoadedPipeline {
    pub fn new(
        generator: Box<dyn Generator>,
        decision: BackendDecision,
        profile: GenerationProfile,
    ) -> Self {
        Self {
            generator,
            decision,
            profile,
        }
    }

    /// Run the bound generator with the pipeline's profile
    pub fn generate(&self, prompt: &str) -> Result<String> {
        self.generator
            .generate(prompt, &self.profile)
            .map_err(Error::Generation)
    }

    pub fn decision(&self) -> &BackendDecision {
        &self.decision
    }

    pub fn profile(&self) -> &GenerationProfile {
        &self.profile
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }
}

impl std::fmt::Debug for LoadedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPipeline")
            .field("model", &self.model_name())
            .field("decision", &self.decision)
            .field("profile", &self.profile)
            .finish()
    }
}
