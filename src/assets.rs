//! Local cache of model and voice assets, filled from a hub repository on
//! demand.
//!
//! # Cache Layout
//!
//! ```text
//! <models_root>/TTS/KokoroTTS/
//! ├── kokoro-v1_0.pth
//! ├── config.json
//! └── voices/
//!     ├── af_heart.pt
//!     └── ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use serde::Deserialize;

use crate::error::{FetchError, TtsError};

/// Per-voice asset extension.
pub const VOICE_EXTENSION: &str = "pt";

/// A required model file hosted outside the main repository. It is stored
/// in the cache directory as `file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalFile {
    pub repo_id: String,
    pub remote_path: String,
    pub file_name: String,
}

/// Which files make up a usable model, and where the voices live remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelManifest {
    pub repo_id: String,
    /// Fetched from `repo_id` under the same name.
    pub model_files: Vec<String>,
    pub external_files: Vec<ExternalFile>,
    pub voices_path: String,
}

impl ModelManifest {
    /// `(repo, remote path, local name)` for every required model file.
    pub fn required_files(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        let own = self
            .model_files
            .iter()
            .map(move |name| (self.repo_id.as_str(), name.as_str(), name.as_str()));
        let external = self.external_files.iter().map(|file| {
            (
                file.repo_id.as_str(),
                file.remote_path.as_str(),
                file.file_name.as_str(),
            )
        });
        own.chain(external)
    }
}

/// Downloads a single file from a repository.
pub trait AssetFetcher {
    /// Fetch `filename` from `repo_id` and place it at `dest`.
    fn fetch(&self, repo_id: &str, filename: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Fetches files through the Hugging Face hub client.
///
/// The hub keeps its own content-addressed cache; the resolved file is copied
/// out of it so the model directory stays self-contained.
#[derive(Debug, Clone, Default)]
pub struct HubFetcher {
    token: Option<String>,
}

impl HubFetcher {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl AssetFetcher for HubFetcher {
    fn fetch(&self, repo_id: &str, filename: &str, dest: &Path) -> Result<(), FetchError> {
        let api = ApiBuilder::new()
            .with_progress(false)
            .with_token(self.token.clone())
            .build()?;
        let cached = api.model(repo_id.to_string()).get(filename)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // Copy next to the destination, then move into place, so `dest` never
        // holds a truncated file.
        let partial = dest.with_extension("part");
        if let Err(e) = fs::copy(&cached, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        fs::rename(&partial, dest)?;
        Ok(())
    }
}

pub struct AssetCache {
    dir: PathBuf,
    manifest: ModelManifest,
    fetcher: Box<dyn AssetFetcher>,
}

impl AssetCache {
    pub fn new(dir: PathBuf, manifest: ModelManifest, fetcher: Box<dyn AssetFetcher>) -> Self {
        Self {
            dir,
            manifest,
            fetcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn voices_dir(&self) -> PathBuf {
        self.dir.join("voices")
    }

    /// Local path of a voice asset, whether or not it exists yet.
    pub fn voice_path(&self, voice_id: &str) -> PathBuf {
        self.voices_dir()
            .join(format!("{voice_id}.{VOICE_EXTENSION}"))
    }

    /// Check that every required model file is present.
    pub fn check_model_cache(&self) -> (bool, String) {
        if !self.dir.exists() {
            return (false, "Model directory not found".to_string());
        }

        let missing: Vec<&str> = self
            .manifest
            .required_files()
            .map(|(_, _, local)| local)
            .filter(|local| !self.dir.join(local).exists())
            .collect();

        if !missing.is_empty() {
            return (false, format!("Missing model files: {}", missing.join(", ")));
        }

        (true, "Model cache verified".to_string())
    }

    /// Fetch every required model file. Files fetched before a failure are
    /// kept; the failing one is removed.
    pub fn download_model(&self) -> (bool, String) {
        match self.fetch_model_files() {
            Ok(()) => (true, "Model files downloaded successfully".to_string()),
            Err(e) => (false, format!("Error downloading model files: {e}")),
        }
    }

    fn fetch_model_files(&self) -> Result<(), FetchError> {
        fs::create_dir_all(&self.dir)?;
        log::info!("Downloading Kokoro model files...");
        for (repo_id, remote, local) in self.manifest.required_files() {
            log::info!("Downloading {remote}...");
            let dest = self.dir.join(local);
            if let Err(e) = self.fetcher.fetch(repo_id, remote, &dest) {
                if dest.exists() {
                    fs::remove_file(&dest)?;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Make sure the model files are present, downloading them if needed.
    pub fn ensure_model(&self) -> Result<(), TtsError> {
        let (ok, message) = self.check_model_cache();
        if ok {
            log::debug!("{message}");
            return Ok(());
        }

        log::info!("Cache check: {message}");
        log::info!("Downloading required model files...");
        let (ok, message) = self.download_model();
        if !ok {
            return Err(TtsError::MissingAsset(message));
        }
        log::info!("{message}");
        Ok(())
    }

    /// Return the local path of a voice asset, downloading it first if it is
    /// not cached. A failed download leaves no file behind.
    pub fn ensure_voice(&self, voice_id: &str) -> Result<PathBuf, TtsError> {
        fs::create_dir_all(self.voices_dir())?;

        let voice_path = self.voice_path(voice_id);
        if voice_path.exists() {
            return Ok(voice_path);
        }

        let voice_file = format!("{voice_id}.{VOICE_EXTENSION}");
        let remote = format!("{}/{voice_file}", self.manifest.voices_path);
        log::info!("Downloading voice: {voice_file}");
        if let Err(source) = self
            .fetcher
            .fetch(&self.manifest.repo_id, &remote, &voice_path)
        {
            log::error!("Failed to download {voice_file}: {source}");
            if voice_path.exists() {
                fs::remove_file(&voice_path)?;
            }
            return Err(TtsError::VoiceDownload {
                voice: voice_id.to_string(),
                source,
            });
        }

        Ok(voice_path)
    }
}
