//! Process-wide pipeline cache
//!
//! Holds the two expensive-or-shared resources of the query path: the loaded
//! generation pipeline and the system prompt. Each slot is initialized at most
//! once; concurrent first callers block on the one in-flight initialization
//! and then share its result. A failed pipeline load leaves the slot empty so
//! a later call can retry.

use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{select_backend, CapabilityProbe, SystemProbe};
use crate::config::Settings;
use crate::error::Result;
use crate::generator::{LoadedPipeline, ModelLoader};

/// System prompt used when the prompt file is missing, unreadable or blank
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Ты — ассистент отдела продаж. Отвечай на вопросы клиентов.";

/// Produces the pipeline on first demand
pub trait PipelineFactory: Send + Sync {
    fn create(&self) -> Result<LoadedPipeline>;
}

/// Probe, select, then load
pub struct LocalPipelineFactory {
    settings: Settings,
    probe: Box<dyn CapabilityProbe>,
}

impl LocalPipelineFactory {
    pub fn new(settings: &Settings) -> Self {
        Self::with_probe(settings, SystemProbe)
    }

    pub fn with_probe(settings: &Settings, probe: impl CapabilityProbe + 'static) -> Self {
        Self {
            settings: settings.clone(),
            probe: Box::new(probe),
        }
    }
}

impl PipelineFactory for LocalPipelineFactory {
    fn create(&self) -> Result<LoadedPipeline> {
        let caps = self.probe.probe();
        let decision = select_backend(&self.settings.backend, &caps, &self.settings.device_hint);
        tracing::info!("Backend selected: {}", decision);

        ModelLoader::new(&self.settings)?.load(&decision)
    }
}

/// Lazily initialized pipeline and system prompt
pub struct PipelineCache {
    factory: Box<dyn PipelineFactory>,
    pipeline: OnceCell<Arc<LoadedPipeline>>,
    system_prompt: OnceCell<Arc<str>>,
}

impl PipelineCache {
    pub fn new(factory: impl PipelineFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            pipeline: OnceCell::new(),
            system_prompt: OnceCell::new(),
        }
    }

    /// Cache backed by the real probe/selector/loader chain
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(LocalPipelineFactory::new(settings))
    }

    /// The loaded pipeline, loading it on the first call
    pub fn get_or_create_pipeline(&self) -> Result<Arc<LoadedPipeline>> {
        self.pipeline
            .get_or_try_init(|| -> Result<Arc<LoadedPipeline>> {
                tracing::info!("Initializing generation pipeline");
                let pipeline = self.factory.create()?;
                tracing::info!("Pipeline initialized: {}", pipeline.model_name());
                Ok(Arc::new(pipeline))
            })
            .cloned()
    }

    /// The system prompt; the first caller's path wins
    pub fn get_or_create_system_prompt(&self, path: &Path) -> Arc<str> {
        self.system_prompt
            .get_or_init(|| Arc::from(read_system_prompt(path)))
            .clone()
    }

    /// Whether the pipeline slot is populated
    pub fn is_loaded(&self) -> bool {
        self.pipeline.get().is_some()
    }
}

fn read_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!("System prompt loaded from {:?}", path);
            text.trim().to_string()
        }
        Ok(_) => {
            tracing::warn!("System prompt file {:?} is empty, using default", path);
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            tracing::warn!("Cannot read system prompt {:?}: {}. Using default", path, e);
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

static SHARED: OnceCell<Arc<PipelineCache>> = OnceCell::new();

/// The process-wide cache, created from the first caller's settings
pub fn shared(settings: &Settings) -> Arc<PipelineCache> {
    SHARED
        .get_or_init(|| Arc::new(PipelineCache::from_settings(settings)))
        .clone()
}
