//! Runtime configuration shared by both nodes.
//!
//! Defaults mirror the host layout: models live under `models/TTS/KokoroTTS`
//! and rendered audio under `output/TTS/<date>`. Every field can be set from a
//! JSON file, from the environment, or through [`TtsConfigBuilder`].

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::Deserialize;

use crate::assets::{ExternalFile, ModelManifest};
use crate::error::TtsError;

/// Model subdirectory below `models_root`.
pub const MODEL_SUBDIR: &str = "TTS/KokoroTTS";

pub const DEFAULT_REPO_ID: &str = "1038lab/KokoroTTS";

#[derive(Debug, Clone, Deserialize, Builder)]
#[serde(default)]
#[builder(default, setter(into))]
pub struct TtsConfig {
    /// Root of the host's model folders.
    pub models_root: PathBuf,
    /// Root of the host's output folder.
    pub output_root: PathBuf,
    /// Hub repository holding both the model files and the voices.
    pub repo_id: String,
    /// Files that must exist in the model directory before synthesis.
    pub model_files: Vec<String>,
    /// Files fetched from other repositories and saved under a local name.
    pub external_files: Vec<ExternalFile>,
    /// Repository folder holding per-voice assets.
    pub voices_path: String,
    #[builder(setter(into, strip_option))]
    pub hf_token: Option<String>,
    /// Inference threads for the ONNX backend. `None` uses the runtime default.
    #[builder(setter(strip_option))]
    pub num_threads: Option<usize>,
    /// Where the ONNX backend stores its optimized graph.
    #[builder(setter(into, strip_option))]
    pub optimized_model_cache_path: Option<PathBuf>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("models"),
            output_root: PathBuf::from("output"),
            repo_id: DEFAULT_REPO_ID.to_string(),
            model_files: vec!["kokoro-v1_0.pth".to_string(), "config.json".to_string()],
            external_files: Vec::new(),
            voices_path: "voices".to_string(),
            hf_token: None,
            num_threads: None,
            optimized_model_cache_path: None,
        }
    }
}

impl TtsConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, TtsError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| TtsError::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults overridden by `KOKORO_MODELS_DIR`, `KOKORO_OUTPUT_DIR` and
    /// `HF_TOKEN`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os("KOKORO_MODELS_DIR") {
            config.models_root = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("KOKORO_OUTPUT_DIR") {
            config.output_root = PathBuf::from(dir);
        }
        config.hf_token = std::env::var("HF_TOKEN").ok();
        config
    }

    /// Directory holding the model files and the `voices/` folder.
    pub fn model_dir(&self) -> PathBuf {
        self.models_root.join(MODEL_SUBDIR)
    }

    pub fn manifest(&self) -> ModelManifest {
        ModelManifest {
            repo_id: self.repo_id.clone(),
            model_files: self.model_files.clone(),
            external_files: self.external_files.clone(),
            voices_path: self.voices_path.clone(),
        }
    }
}
