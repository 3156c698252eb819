//! Synthesis backends.
//!
//! Enable via Cargo features:
//! - `kokoro` - Kokoro-82M on ONNX Runtime (espeak-ng required)

#[cfg(feature = "kokoro")]
pub mod kokoro;
