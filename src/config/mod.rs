//! Environment-sourced settings
//!
//! Values are read once into an immutable [`Settings`] record. Resolution only
//! checks presence; components that consume a value are responsible for
//! rejecting it when it is malformed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "Qwen/Qwen2-1.5B-Instruct";
pub const DEFAULT_BACKEND: &str = "auto";
pub const DEFAULT_DEVICE_HINT: &str = "CPU";
pub const DEFAULT_KNOWLEDGE_BASE: &str = "knowledge_base";
pub const DEFAULT_INDEX_PATH: &str = "./chroma_db";
pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "knowledge_base/system_prompt.txt";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_BACKEND: &str = "candle";
pub const DEFAULT_TOP_K: &str = "4";

/// Resolved process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// HuggingFace model ID or local directory of the generation model
    pub model_id: String,

    /// Model weight cache directory (None = hub default)
    pub cache_dir: Option<PathBuf>,

    /// Raw backend preference ("auto", "compiled", "quantized", "cpu", ...)
    pub backend: String,

    /// Device for the compiler-optimized runtime
    pub device_hint: String,

    /// Repository holding the 4-bit GGUF weights (None = "<model_id>-GGUF")
    ///
    /// Must contain a `*q4_0.gguf` file. With the `quantized` feature on, an
    /// accelerator machine picks this path under `auto` and fails to load if
    /// the artifact is missing; set `INFERENCE_BACKEND=cpu` in that case.
    pub quantized_repo: Option<String>,

    /// Repository holding the exported ONNX graph (None = model repo)
    pub compiled_repo: Option<String>,

    /// Knowledge-base root directory
    pub knowledge_base: PathBuf,

    /// Vector index persistence directory
    pub index_path: PathBuf,

    /// File holding the system prompt
    pub system_prompt_path: PathBuf,

    /// Embedding model ID or local directory
    pub embedding_model: String,

    /// Embedding backend ("candle" or "token")
    pub embedding_backend: String,

    /// Raw retrieval depth, validated by [`Settings::top_k`]
    pub top_k: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Self {
            model_id: or("MODEL_NAME", DEFAULT_MODEL_ID),
            cache_dir: get("HF_HOME").map(PathBuf::from),
            backend: or("INFERENCE_BACKEND", DEFAULT_BACKEND),
            device_hint: get("OPENVINO_DEVICE")
                .or_else(|| get("INFERENCE_DEVICE"))
                .unwrap_or_else(|| DEFAULT_DEVICE_HINT.to_string()),
            quantized_repo: get("QUANTIZED_MODEL_REPO"),
            compiled_repo: get("COMPILED_MODEL_REPO"),
            knowledge_base: PathBuf::from(or("KB_PATH", DEFAULT_KNOWLEDGE_BASE)),
            index_path: PathBuf::from(
                get("PERSIST_DIRECTORY")
                    .or_else(|| get("CHROMA_DB_PATH"))
                    .or_else(|| get("VECTOR_DB_PATH"))
                    .unwrap_or_else(|| DEFAULT_INDEX_PATH.to_string()),
            ),
            system_prompt_path: PathBuf::from(or(
                "SYSTEM_PROMPT_PATH",
                DEFAULT_SYSTEM_PROMPT_PATH,
            )),
            embedding_model: or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_backend: or("EMBEDDING_BACKEND", DEFAULT_EMBEDDING_BACKEND),
            top_k: or("RETRIEVAL_TOP_K", DEFAULT_TOP_K),
        }
    }

    /// Retrieval depth as a positive integer
    pub fn top_k(&self) -> Result<usize> {
        match self.top_k.trim().parse::<usize>() {
            Ok(0) => Err(Error::config("RETRIEVAL_TOP_K", "must be at least 1")),
            Ok(k) => Ok(k),
            Err(e) => Err(Error::config(
                "RETRIEVAL_TOP_K",
                format!("'{}' is not a number: {}", self.top_k, e),
            )),
        }
    }

    /// Set the generation model
    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.model_id = model_id.to_string();
        self
    }

    /// Set the backend preference
    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    /// Set the vector index directory
    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }

    /// Set the knowledge-base root
    pub fn with_knowledge_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base = path.into();
        self
    }

    /// Set the embedding backend
    pub fn with_embedding_backend(mut self, backend: &str) -> Self {
        self.embedding_backend = backend.to_string();
        self
    }
}
