use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::vocab::{load_vocab, punctuation_ids};
use super::voices::StyleTable;

/// Maximum number of phoneme tokens per inference call, before padding.
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension.
pub const STYLE_DIM: usize = 256;

/// Crossfade applied where two over-long chunks meet (10 ms at 24 kHz).
const CHUNK_CROSSFADE_SAMPLES: usize = 240;

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("No espeak-ng voice for language code '{0}'")]
    UnsupportedLanguage(String),
}

/// A loaded Kokoro ONNX session plus the vocabulary it was exported with.
pub struct KokoroModel {
    session: Session,
    vocab: HashMap<char, i64>,
    split_ids: Vec<i64>,
    /// "input_ids" or "tokens", depending on the export.
    tokens_input_name: String,
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load the model from `model_dir`, which must hold an `.onnx` export and
    /// the `config.json` carrying its vocabulary.
    pub fn load(
        model_dir: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let session = init_session(&onnx_path, num_threads, optimized_cache_path)?;
        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        log::debug!("Detected: tokens_input='{tokens_input_name}', speed_is_int32={speed_is_int32}");

        let vocab = load_vocab(&model_dir.join("config.json"))?;
        let split_ids = punctuation_ids(&vocab);

        Ok(Self {
            session,
            vocab,
            split_ids,
            tokens_input_name,
            speed_is_int32,
        })
    }

    pub fn vocab(&self) -> &HashMap<char, i64> {
        &self.vocab
    }

    /// Render phoneme token ids with a voice's style table. Sequences longer
    /// than [`MAX_PHONEME_LEN`] are cut at punctuation and crossfaded back
    /// together.
    pub fn synthesize(
        &mut self,
        ids: &[i64],
        styles: &StyleTable,
        speed: f32,
    ) -> Result<Vec<f32>, KokoroError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // One style row for the whole sequence keeps prosody stable across
        // sub-chunks.
        let style = styles.for_token_count(ids.len());

        let chunks = if ids.len() > MAX_PHONEME_LEN {
            log::debug!(
                "Phoneme sequence exceeded limit ({} > {MAX_PHONEME_LEN}), chunking",
                ids.len()
            );
            split_chunks(ids, &self.split_ids)
        } else {
            vec![ids.to_vec()]
        };

        let mut combined = Vec::with_capacity(ids.len() * 300);
        for chunk_ids in &chunks {
            let audio = self.run(chunk_ids, style, speed)?;
            if audio.is_empty() {
                continue;
            }
            if combined.is_empty() {
                combined.extend_from_slice(&audio);
            } else {
                append_with_crossfade(&mut combined, &audio, CHUNK_CROSSFADE_SAMPLES);
            }
        }

        Ok(combined)
    }

    fn run(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<Vec<f32>, KokoroError> {
        // [[0, t1..tN, 0]]
        let seq_len = tokens.len() + 2;
        let mut padded = vec![0i64; seq_len];
        padded[1..seq_len - 1].copy_from_slice(tokens);
        let tokens_arr = Array2::from_shape_vec((1, seq_len), padded)?;
        let style_view = ndarray::ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed.round() as i32]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        };

        let (_, waveform) = output
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("No output from model")))?;
        let waveform = waveform.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}

/// Prefers `kokoro-quant-convinteger.onnx`, then the first `.onnx` file found.
pub(crate) fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join("kokoro-quant-convinteger.onnx");
    if preferred.exists() {
        return Ok(preferred);
    }

    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
            return Ok(path);
        }
    }

    Err(KokoroError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!(
            "No .onnx file found in {}. List the ONNX export in `model_files` or `external_files`.",
            model_dir.display()
        ),
    )))
}

/// Build a CPU session. With a cache path, the first load runs Level3
/// optimization and saves the graph there; later loads read it back with
/// optimization disabled.
fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, KokoroError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let (load_path, opt_level, save_to) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized Kokoro graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!(
                "First load: running Level3 optimization; saving graph to {}",
                cache.display()
            );
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let Some(cache) = save_to {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

fn detect_tokens_input(session: &Session) -> String {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "input_ids" || *name == "tokens")
        .unwrap_or("input_ids")
        .to_string()
}

/// Whether the `speed` input is int32. Exports that omit the type default to
/// int32.
fn detect_speed_type(session: &Session) -> bool {
    match session.inputs().iter().find(|input| input.name() == "speed") {
        Some(input) => {
            let dtype = format!("{:?}", input.dtype());
            dtype.contains("Int32") || dtype.contains("int32")
        }
        None => true,
    }
}

/// Cut `ids` into runs of at most [`MAX_PHONEME_LEN`], breaking after the
/// last punctuation token in each window when there is one.
fn split_chunks(ids: &[i64], split_ids: &[i64]) -> Vec<Vec<i64>> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < ids.len() {
        let end = (start + MAX_PHONEME_LEN).min(ids.len());
        if end == ids.len() {
            chunks.push(ids[start..end].to_vec());
            break;
        }

        let split = ids[start..end]
            .iter()
            .rposition(|id| split_ids.contains(id))
            .map(|i| start + i + 1)
            .unwrap_or(end);

        chunks.push(ids[start..split].to_vec());
        start = split;
    }

    chunks
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        dst[dst_start + i] = dst[dst_start + i] * (1.0 - t) + src[i] * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}

#[cfg(test)]
mod tests {
    use super::{append_with_crossfade, split_chunks, MAX_PHONEME_LEN};

    #[test]
    fn short_sequences_stay_whole() {
        let ids = vec![7; 20];
        assert_eq!(split_chunks(&ids, &[4]), vec![ids]);
    }

    #[test]
    fn long_sequences_break_after_punctuation() {
        let mut ids = vec![50; MAX_PHONEME_LEN + 40];
        ids[300] = 4;
        let chunks = split_chunks(&ids, &[4]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 301);
        assert_eq!(chunks[0].last(), Some(&4));
        assert_eq!(chunks[1].len(), ids.len() - 301);
    }

    #[test]
    fn long_sequences_without_punctuation_cut_at_limit() {
        let ids = vec![50; MAX_PHONEME_LEN * 2 + 1];
        let chunks = split_chunks(&ids, &[4]);
        let lens: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![MAX_PHONEME_LEN, MAX_PHONEME_LEN, 1]);
    }

    #[test]
    fn crossfade_overlaps_the_seam() {
        let mut dst = vec![1.0; 10];
        append_with_crossfade(&mut dst, &[0.0; 10], 4);
        assert_eq!(dst.len(), 16);
        assert!(dst[6] < 1.0 && dst[6] > 0.0);
        assert_eq!(dst[15], 0.0);
    }

    #[test]
    fn crossfade_with_empty_destination_appends() {
        let mut dst = Vec::new();
        append_with_crossfade(&mut dst, &[0.5, 0.5], 240);
        assert_eq!(dst, vec![0.5, 0.5]);
    }
}
