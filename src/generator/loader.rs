//! Model loading under a chosen backend
//!
//! The loader never falls back: every failure is a [`Error::ModelLoad`] with
//! the cause attached. Fallback belongs to backend selection.

use anyhow::{Context, Result};
#[cfg(feature = "quantized")]
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM as Qwen2Model};
#[cfg(feature = "quantized")]
use candle_transformers::models::quantized_qwen2::ModelWeights as QuantizedQwen2;

use super::candle::{GeneratorModel, LocalGenerator};
use super::{GenerationProfile, LoadedPipeline};
use crate::backend::{open_device, BackendDecision, BackendStrategy, QuantizationProfile};
use crate::config::Settings;
use crate::error::Error;
use crate::hub::{HubApi, HubModelConfig};
use crate::tokenizer::TokenizerWrapper;

/// Builds a [`LoadedPipeline`] from settings and a backend decision
pub struct ModelLoader {
    settings: Settings,
    hub: HubApi,
}

impl ModelLoader {
    pub fn new(settings: &Settings) -> crate::Result<Self> {
        let hub = HubApi::new(settings.cache_dir.as_deref()).map_err(Error::ModelLoad)?;
        Ok(Self {
            settings: settings.clone(),
            hub,
        })
    }

    /// Load tokenizer and model for `decision`
    pub fn load(&self, decision: &BackendDecision) -> crate::Result<LoadedPipeline> {
        self.load_internal(decision).map_err(Error::ModelLoad)
    }

    fn load_internal(&self, decision: &BackendDecision) -> Result<LoadedPipeline> {
        let model_id = &self.settings.model_id;
        tracing::info!("Loading model {} ({})", model_id, decision.strategy);

        // Backend-independent, and cheaper to fail on than the weights
        let tokenizer_file = self
            .hub
            .tokenizer_file(model_id)
            .context("Failed to resolve tokenizer")?;
        let tokenizer = TokenizerWrapper::from_file(tokenizer_file)?;

        let device = open_device(&decision.device)
            .with_context(|| format!("Failed to open device {}", decision.device))?;

        let model = match &decision.strategy {
            BackendStrategy::CompilerOptimized => self.load_compiled(&decision.device)?,
            BackendStrategy::QuantizedDevice(profile) => self.load_quantized(profile, &device)?,
            BackendStrategy::DeviceMapped(precision) => {
                self.load_safetensors(precision.dtype(), &device)?
            }
            BackendStrategy::Cpu => self.load_safetensors(DType::F32, &device)?,
        };

        let generator = LocalGenerator::new(model, tokenizer, device, model_id);
        tracing::info!("Generator loaded successfully");

        Ok(LoadedPipeline::new(
            Box::new(generator),
            decision.clone(),
            GenerationProfile::default(),
        ))
    }

    fn load_safetensors(&self, dtype: DType, device: &Device) -> Result<GeneratorModel> {
        let files = self.hub.model_files(&self.settings.model_id)?;
        let model_config = HubModelConfig::from_file(&files.config_file)?;
        if !model_config.is_qwen2() {
            anyhow::bail!(
                "Unsupported model architecture: {:?} (model_type {:?}). Supported: qwen2",
                model_config.architectures,
                model_config.model_type
            );
        }

        let config_str = std::fs::read_to_string(&files.config_file)
            .context("Failed to read model config")?;
        let qwen_config: Qwen2Config =
            serde_json::from_str(&config_str).context("Failed to parse Qwen2 config")?;

        tracing::info!(
            "Loading Qwen2: hidden={}, layers={}, shards={}, dtype={:?}",
            qwen_config.hidden_size,
            qwen_config.num_hidden_layers,
            files.weight_files.len(),
            dtype
        );

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&files.weight_files, dtype, device)
                .context("Failed to load model weights")?
        };
        let model = Qwen2Model::new(&qwen_config, vb).context("Failed to create Qwen2 model")?;
        Ok(GeneratorModel::Qwen2(model))
    }

    #[cfg(feature = "quantized")]
    fn load_quantized(&self, profile: &QuantizationProfile, device: &Device) -> Result<GeneratorModel> {
        let path = self.hub.gguf_file(
            &self.settings.model_id,
            self.settings.quantized_repo.as_deref(),
            profile.artifact_suffix(),
        )?;
        tracing::info!("Loading quantized weights ({}) from {:?}", profile, path);

        let mut file =
            std::fs::File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
        let content = gguf_file::Content::read(&mut file)
            .with_context(|| format!("Failed to read GGUF header of {:?}", path))?;
        let model = QuantizedQwen2::from_gguf(content, &mut file, device)
            .context("Failed to create quantized Qwen2 model")?;
        Ok(GeneratorModel::Quantized(model))
    }

    #[cfg(not(feature = "quantized"))]
    fn load_quantized(&self, _profile: &QuantizationProfile, _device: &Device) -> Result<GeneratorModel> {
        anyhow::bail!("quantized device runtime not compiled in (enable the 'quantized' feature)")
    }

    #[cfg(feature = "onnx")]
    fn load_compiled(&self, target: &crate::backend::DeviceTarget) -> Result<GeneratorModel> {
        let path = self.hub.onnx_file(
            &self.settings.model_id,
            self.settings.compiled_repo.as_deref(),
        )?;
        let hint = match target {
            crate::backend::DeviceTarget::Runtime(name) => name.as_str(),
            _ => self.settings.device_hint.as_str(),
        };
        let model = super::onnx::OnnxCausalLm::load(&path, hint)?;
        Ok(GeneratorModel::Onnx(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_compiled(&self, _target: &crate::backend::DeviceTarget) -> Result<GeneratorModel> {
        anyhow::bail!("compiler-optimized runtime not compiled in (enable the 'onnx' feature)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Capabilities;

    fn cpu_decision() -> BackendDecision {
        crate::backend::select_backend("cpu", &Capabilities::cpu_only(), "CPU")
    }

    #[test]
    fn test_missing_local_model_is_model_load_error() {
        let settings = Settings::default().with_model_id("./no-such-model-dir");
        let loader = ModelLoader::new(&settings).unwrap();
        let err = loader.load(&cpu_decision()).unwrap_err();

        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(err.to_string().contains("tokenizer"));
    }

    #[test]
    fn test_tokenizer_failure_stops_before_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "not json").unwrap();
        let settings = Settings::default().with_model_id(&dir.path().to_string_lossy());

        let err = ModelLoader::new(&settings)
            .unwrap()
            .load(&cpu_decision())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load tokenizer"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_compiled_without_runtime_fails_loudly() {
        let settings = Settings::default();
        let loader = ModelLoader::new(&settings).unwrap();
        assert!(loader
            .load_compiled(&crate::backend::DeviceTarget::Runtime("CPU".to_string()))
            .is_err());
    }

    #[cfg(feature = "quantized")]
    #[test]
    fn test_quantized_without_gguf_names_the_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        let settings = Settings::default().with_model_id(&dir.path().to_string_lossy());
        let loader = ModelLoader::new(&settings).unwrap();

        let err = loader
            .load_quantized(&QuantizationProfile::Q4_0, &Device::Cpu)
            .err()
            .unwrap();
        assert!(err.to_string().contains("q4_0.gguf"));
    }

    #[cfg(not(feature = "quantized"))]
    #[test]
    fn test_quantized_without_runtime_fails_loudly() {
        let loader = ModelLoader::new(&Settings::default()).unwrap();
        let err = loader
            .load_quantized(&QuantizationProfile::Q4_0, &Device::Cpu)
            .err()
            .unwrap();
        assert!(err.to_string().contains("quantized"));
    }

    #[test]
    #[ignore]
    fn test_load_default_model_on_cpu() {
        let settings = Settings::default().with_model_id("Qwen/Qwen2-0.5B-Instruct");
        let pipeline = ModelLoader::new(&settings).unwrap().load(&cpu_decision()).unwrap();
        let output = pipeline.generate("<|im_start|>user\nHi<|im_end|>\n<|im_start|>assistant\n").unwrap();
        assert!(output.starts_with("<|im_start|>user"));
    }
}
