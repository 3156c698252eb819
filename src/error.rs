use std::path::PathBuf;

use crate::audio::AudioError;

/// Errors surfaced by the TTS and save nodes.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    MissingAsset(String),
    #[error("Failed to download voice file: {voice}.pt")]
    VoiceDownload {
        voice: String,
        #[source]
        source: FetchError,
    },
    #[error("{0}")]
    MissingOptionalDependency(String),
    #[error("Error creating pipeline for language {lang_code}: {source}")]
    PipelineConstruction {
        lang_code: String,
        #[source]
        source: PipelineError,
    },
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] PipelineError),
    #[error("No audio generated")]
    EmptySynthesisResult,
    #[error("Failed to write {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: AudioError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Failure reported by an [`AssetFetcher`](crate::assets::AssetFetcher).
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("hub request failed: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a synthesis pipeline, either while building it or
/// while producing segments.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct PipelineError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PipelineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
