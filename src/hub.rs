//! HuggingFace Hub integration for model artifacts
//!
//! Resolves model files either from a local directory or from the Hub,
//! downloading into the configured cache directory when needed. Each backend
//! needs a different artifact: safetensors weights (device-mapped and CPU),
//! a 4-bit GGUF file (quantized device) or an exported ONNX graph
//! (compiler-optimized).

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const SAFETENSORS: &str = "model.safetensors";
const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";
const ONNX_CANDIDATES: [&str; 2] = ["onnx/model.onnx", "model.onnx"];

/// Where a model identifier points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Hub(String),
}

impl ModelSource {
    /// Classify an identifier: existing paths and path-like strings are local,
    /// everything else is a Hub repository id
    pub fn locate(model_id_or_path: &str) -> Result<Self> {
        let path = Path::new(model_id_or_path);
        let looks_local = model_id_or_path.starts_with('.')
            || model_id_or_path.starts_with('/')
            || model_id_or_path.starts_with('~');

        if path.exists() {
            Ok(Self::Local(path.to_path_buf()))
        } else if looks_local {
            Err(anyhow!(
                "Local model path does not exist: {}",
                model_id_or_path
            ))
        } else {
            Ok(Self::Hub(model_id_or_path.to_string()))
        }
    }
}

/// Files making up a safetensors model
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config_file: PathBuf,
    /// One file, or every shard listed in the safetensors index
    pub weight_files: Vec<PathBuf>,
}

/// HuggingFace Hub API wrapper
pub struct HubApi {
    api: Api,
}

impl HubApi {
    /// Create a Hub client; `cache_dir` follows the HF_HOME layout
    pub fn new(cache_dir: Option<&Path>) -> Result<Self> {
        let builder = match cache_dir {
            Some(dir) => ApiBuilder::new().with_cache_dir(dir.join("hub")),
            None => ApiBuilder::new(),
        };
        let api = builder
            .build()
            .context("Failed to initialize HuggingFace Hub API")?;
        Ok(Self { api })
    }

    /// Resolve config and safetensors weights for a model
    pub fn model_files(&self, model_id_or_path: &str) -> Result<ModelFiles> {
        match ModelSource::locate(model_id_or_path)? {
            ModelSource::Local(dir) => {
                tracing::info!("Loading model from local path: {}", dir.display());
                let config_file = dir.join("config.json");
                if !config_file.exists() {
                    return Err(anyhow!("config.json not found in {:?}", dir));
                }
                let weight_files = local_weight_files(&dir)?;
                Ok(ModelFiles {
                    config_file,
                    weight_files,
                })
            }
            ModelSource::Hub(repo_id) => {
                tracing::info!("Fetching model from HuggingFace Hub: {}", repo_id);
                let repo = self.api.model(repo_id.clone());

                let config_file = repo
                    .get("config.json")
                    .with_context(|| format!("Failed to download config.json for {}", repo_id))?;

                let weight_files = if let Ok(path) = repo.get(SAFETENSORS) {
                    vec![path]
                } else {
                    let index = repo.get(SAFETENSORS_INDEX).with_context(|| {
                        format!(
                            "No weights found for {} (tried {} and {})",
                            repo_id, SAFETENSORS, SAFETENSORS_INDEX
                        )
                    })?;
                    let mut files = Vec::new();
                    for shard in shard_names(&index)? {
                        tracing::debug!("Fetching shard {}", shard);
                        files.push(
                            repo.get(&shard)
                                .with_context(|| format!("Failed to download shard {}", shard))?,
                        );
                    }
                    files
                };

                Ok(ModelFiles {
                    config_file,
                    weight_files,
                })
            }
        }
    }

    /// Resolve tokenizer.json for a model
    pub fn tokenizer_file(&self, model_id_or_path: &str) -> Result<PathBuf> {
        match ModelSource::locate(model_id_or_path)? {
            ModelSource::Local(dir) => {
                let path = dir.join("tokenizer.json");
                if path.exists() {
                    Ok(path)
                } else {
                    Err(anyhow!("tokenizer.json not found in {:?}", dir))
                }
            }
            ModelSource::Hub(repo_id) => self
                .api
                .model(repo_id.clone())
                .get("tokenizer.json")
                .with_context(|| format!("Failed to download tokenizer.json for {}", repo_id)),
        }
    }

    /// Resolve a GGUF file whose name ends with `suffix`
    ///
    /// Looks in `repo_override` when given, else in `<model_id>-GGUF`; a local
    /// model directory is searched directly.
    pub fn gguf_file(
        &self,
        model_id_or_path: &str,
        repo_override: Option<&str>,
        suffix: &str,
    ) -> Result<PathBuf> {
        let target = match repo_override {
            Some(repo) => repo.to_string(),
            None => match ModelSource::locate(model_id_or_path)? {
                ModelSource::Local(dir) => return local_file_with_suffix(&dir, suffix),
                ModelSource::Hub(repo_id) => format!("{}-GGUF", repo_id),
            },
        };

        match ModelSource::locate(&target)? {
            ModelSource::Local(dir) => local_file_with_suffix(&dir, suffix),
            ModelSource::Hub(repo_id) => {
                let repo = self.api.model(repo_id.clone());
                let info = repo
                    .info()
                    .with_context(|| format!("Failed to list files of {}", repo_id))?;
                let names: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
                let name = find_with_suffix(&names, suffix)
                    .ok_or_else(|| anyhow!("No *{} file in {}", suffix, repo_id))?;
                tracing::info!("Fetching {} from {}", name, repo_id);
                repo.get(name)
                    .with_context(|| format!("Failed to download {} from {}", name, repo_id))
            }
        }
    }

    /// Resolve an exported ONNX graph (`onnx/model.onnx`, then `model.onnx`)
    pub fn onnx_file(&self, model_id_or_path: &str, repo_override: Option<&str>) -> Result<PathBuf> {
        let target = repo_override.unwrap_or(model_id_or_path);
        match ModelSource::locate(target)? {
            ModelSource::Local(dir) => ONNX_CANDIDATES
                .iter()
                .map(|c| dir.join(c))
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No ONNX graph in {:?} (tried {:?})", dir, ONNX_CANDIDATES)),
            ModelSource::Hub(repo_id) => {
                let repo = self.api.model(repo_id.clone());
                ONNX_CANDIDATES
                    .iter()
                    .find_map(|c| repo.get(c).ok())
                    .ok_or_else(|| {
                        anyhow!("No ONNX graph in {} (tried {:?})", repo_id, ONNX_CANDIDATES)
                    })
            }
        }
    }
}

/// Subset of a model's config.json used to pick an architecture
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,

    pub model_type: Option<String>,
}

impl HubModelConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        serde_json::from_str(&content).context("Failed to parse config.json")
    }

    /// Whether the model belongs to the Qwen2 family
    pub fn is_qwen2(&self) -> bool {
        match &self.model_type {
            Some(model_type) => model_type == "qwen2",
            None => self
                .architectures
                .iter()
                .any(|arch| arch.starts_with("Qwen2")),
        }
    }
}

fn local_weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let single = dir.join(SAFETENSORS);
    if single.exists() {
        return Ok(vec![single]);
    }
    let index = dir.join(SAFETENSORS_INDEX);
    if index.exists() {
        return Ok(shard_names(&index)?
            .into_iter()
            .map(|name| dir.join(name))
            .collect());
    }
    Err(anyhow!(
        "No safetensors weights found in {:?} (tried {} and {})",
        dir,
        SAFETENSORS,
        SAFETENSORS_INDEX
    ))
}

/// Distinct shard file names listed in a safetensors index, in sorted order
fn shard_names(index_file: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(index_file)
        .with_context(|| format!("Failed to read {:?}", index_file))?;
    let json: serde_json::Value =
        serde_json::from_str(&content).context("Failed to parse safetensors index")?;
    let weight_map = json
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| anyhow!("safetensors index has no weight_map"))?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if shards.is_empty() {
        return Err(anyhow!("safetensors index lists no shards"));
    }
    Ok(shards.into_iter().collect())
}

fn find_with_suffix<'a>(names: &'a [String], suffix: &str) -> Option<&'a str> {
    let suffix = suffix.to_lowercase();
    names
        .iter()
        .map(String::as_str)
        .find(|name| name.to_lowercase().ends_with(&suffix))
}

fn local_file_with_suffix(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    names.sort();
    find_with_suffix(&names, suffix)
        .map(|name| dir.join(name))
        .ok_or_else(|| anyhow!("No *{} file in {:?}", suffix, dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate() {
        assert!(ModelSource::locate("./missing-model")
            .is_err_and(|e| e.to_string().contains("does not exist")));
        assert_eq!(
            ModelSource::locate("Qwen/Qwen2-1.5B-Instruct").unwrap(),
            ModelSource::Hub("Qwen/Qwen2-1.5B-Instruct".to_string())
        );

        let dir = TempDir::new().unwrap();
        let id = dir.path().to_string_lossy().to_string();
        assert_eq!(
            ModelSource::locate(&id).unwrap(),
            ModelSource::Local(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_sharded_weights_from_local_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SAFETENSORS_INDEX),
            r#"{"metadata": {}, "weight_map": {
                "a": "model-00002-of-00002.safetensors",
                "b": "model-00001-of-00002.safetensors",
                "c": "model-00001-of-00002.safetensors"
            }}"#,
        )
        .unwrap();

        let files = local_weight_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_single_file_preferred_over_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SAFETENSORS), b"").unwrap();
        std::fs::write(dir.path().join(SAFETENSORS_INDEX), "{}").unwrap();
        assert_eq!(
            local_weight_files(dir.path()).unwrap(),
            vec![dir.path().join(SAFETENSORS)]
        );
    }

    #[test]
    fn test_missing_weights() {
        let dir = TempDir::new().unwrap();
        assert!(local_weight_files(dir.path()).is_err());
    }

    #[test]
    fn test_gguf_lookup_in_local_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("qwen2-1_5b-instruct-q8_0.gguf"), b"").unwrap();
        std::fs::write(dir.path().join("qwen2-1_5b-instruct-Q4_0.gguf"), b"").unwrap();

        let found = local_file_with_suffix(dir.path(), "q4_0.gguf").unwrap();
        assert_eq!(found, dir.path().join("qwen2-1_5b-instruct-Q4_0.gguf"));
        assert!(local_file_with_suffix(dir.path(), "q2_k.gguf").is_err());
    }

    #[test]
    fn test_onnx_lookup_in_local_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("onnx")).unwrap();
        std::fs::write(dir.path().join("onnx/model.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"").unwrap();

        let hub = HubApi::new(Some(dir.path())).unwrap();
        let id = dir.path().to_string_lossy().to_string();
        assert_eq!(hub.onnx_file(&id, None).unwrap(), dir.path().join("onnx/model.onnx"));
    }

    #[test]
    fn test_qwen2_detection() {
        let config: HubModelConfig =
            serde_json::from_str(r#"{"model_type": "qwen2", "hidden_size": 1536}"#).unwrap();
        assert!(config.is_qwen2());

        let config: HubModelConfig =
            serde_json::from_str(r#"{"architectures": ["LlamaForCausalLM"]}"#).unwrap();
        assert!(!config.is_qwen2());

        let config: HubModelConfig =
            serde_json::from_str(r#"{"architectures": ["Qwen2ForCausalLM"]}"#).unwrap();
        assert!(config.is_qwen2());
    }
}
