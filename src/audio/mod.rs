//! Audio buffers as exchanged between nodes, plus resampling, encoding and
//! header probing.

pub mod encode;
pub mod probe;
pub mod resample;

use ndarray::{Array1, Array2, Array3, Axis};

pub use encode::{encode_to_file, AudioFormat};
pub use probe::{probe_file, AudioInfo};
pub use resample::resample;

/// Added to the peak before dividing so silence does not divide by zero.
pub const NORMALIZE_EPSILON: f32 = 1e-6;

/// Sample rate of the placeholder returned when synthesis fails.
pub const PLACEHOLDER_SAMPLE_RATE: u32 = 16000;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Probe failed: {0}")]
    Probe(#[from] symphonia::core::errors::Error),
    #[error("Resampling failed: {0}")]
    Resample(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Unsupported audio: {0}")]
    Unsupported(String),
}

/// A waveform in the host's tensor layout, `[batch, channels, samples]`,
/// together with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub waveform: Array3<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(waveform: Array3<f32>, sample_rate: u32) -> Self {
        Self {
            waveform,
            sample_rate,
        }
    }

    /// Single-channel buffer shaped `[1, 1, n]`.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        let waveform = Array1::from(samples)
            .insert_axis(Axis(0))
            .insert_axis(Axis(0));
        Self::new(waveform, sample_rate)
    }

    /// Silent single-channel buffer of `frames` samples.
    pub fn silence(frames: usize, sample_rate: u32) -> Self {
        Self::new(Array3::zeros((1, 1, frames)), sample_rate)
    }

    /// One second of silence, substituted for a failed synthesis.
    pub fn placeholder() -> Self {
        Self::silence(PLACEHOLDER_SAMPLE_RATE as usize, PLACEHOLDER_SAMPLE_RATE)
    }

    /// Build a single-batch buffer from per-channel sample vectors.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, AudioError> {
        let count = channels.len();
        let frames = channels.first().map_or(0, Vec::len);
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AudioError::Unsupported(
                "channel length mismatch".to_string(),
            ));
        }
        let flat: Vec<f32> = channels.into_iter().flatten().collect();
        let waveform = Array2::from_shape_vec((count, frames), flat)?.insert_axis(Axis(0));
        Ok(Self::new(waveform, sample_rate))
    }

    pub fn batch(&self) -> usize {
        self.waveform.len_of(Axis(0))
    }

    pub fn channels(&self) -> usize {
        self.waveform.len_of(Axis(1))
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.waveform.len_of(Axis(2))
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.waveform.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Per-channel samples with the batch dimension dropped. Only a single
    /// batch entry can be dropped.
    pub fn squeeze_batch(&self) -> Result<Vec<Vec<f32>>, AudioError> {
        if self.batch() != 1 {
            return Err(AudioError::Unsupported(format!(
                "expected a single batch entry, got {}",
                self.batch()
            )));
        }
        Ok(self
            .waveform
            .index_axis(Axis(0), 0)
            .outer_iter()
            .map(|channel| channel.to_vec())
            .collect())
    }
}

/// Scale `samples` so the loudest one sits at `volume`.
pub fn normalize(samples: &mut [f32], volume: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let scale = volume / (peak + NORMALIZE_EPSILON);
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
}
