//! Kokoro-82M backend on ONNX Runtime.
//!
//! [`KokoroPipelineBuilder`] plugs into [`PipelineFactory`](crate::pipeline::PipelineFactory)
//! and builds one [`KokoroPipeline`] per language code. Text is phonemized
//! with espeak-ng, so it must be installed:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: <https://espeak-ng.org/download>
//!
//! # Model directory
//!
//! ```text
//! models/TTS/KokoroTTS/
//! ├── kokoro-v1_0.onnx     # ONNX export, fetched from onnx-community
//! ├── config.json          # phoneme vocabulary
//! └── voices/
//!     └── af_heart.pt      # fetched on first use
//! ```
//!
//! # Languages
//!
//! | Code | Language | espeak-ng voice |
//! |---|---|---|
//! | `a` | American English | `en-us` |
//! | `b` | British English | `en-gb` |
//! | `e` | Spanish | `es` |
//! | `f` | French | `fr-fr` |
//! | `h` | Hindi | `hi` |
//! | `i` | Italian | `it` |
//! | `j` | Japanese | `ja` |
//! | `p` | Brazilian Portuguese | `pt-br` |
//! | `z` | Mandarin Chinese | `cmn` |

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod vocab;
pub mod voices;

pub use engine::{
    onnx_export, with_onnx_export, KokoroModelParams, KokoroPipeline, KokoroPipelineBuilder,
};
pub use model::KokoroError;
