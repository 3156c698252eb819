//! # kokoro-nodes
//!
//! Kokoro text-to-speech and audio persistence as nodes for a node-graph
//! host.
//!
//! - [`TextToSpeechNode`] renders text with one of the catalog voices,
//!   fetching model and voice files from the Hugging Face Hub on demand.
//! - [`SaveAudioNode`] writes audio as WAV, MP3 or FLAC with auto-numbered
//!   file names.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! kokoro-nodes = { version = "2026.2", features = ["kokoro"] }
//! ```
//!
//! ```ignore
//! use kokoro_nodes::nodes::{register_nodes, NodeInputs, NodeRegistry, NodeValue};
//! use kokoro_nodes::TtsConfig;
//!
//! let mut registry = NodeRegistry::new();
//! register_nodes(&mut registry, &TtsConfig::from_env());
//!
//! let outputs = registry.execute(
//!     "KokoroTTS",
//!     NodeInputs::new().with("text", NodeValue::Text("Hello, world!".into())),
//! )?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assets;
pub mod audio;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod engines;
pub mod error;
pub mod nodes;
pub mod pipeline;

pub use audio::{AudioBuffer, AudioFormat};
pub use catalog::{Voice, VoiceCatalog};
pub use config::{TtsConfig, TtsConfigBuilder};
pub use error::TtsError;
pub use nodes::{Quality, SaveAudioNode, TextToSpeechNode};
