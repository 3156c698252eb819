use std::path::{Path, PathBuf};

use crate::assets::ExternalFile;
use crate::config::TtsConfig;
use crate::error::PipelineError;
use crate::pipeline::{PipelineBuilder, Segment, SegmentStream, SynthesisPipeline, SynthesisRequest};

use super::model::{KokoroError, KokoroModel};
use super::phonemizer::{espeak_language, phonemize, EspeakConfig};
use super::voices::VoiceStore;

/// Hub repository publishing the Kokoro-82M ONNX export.
pub const ONNX_REPO_ID: &str = "onnx-community/Kokoro-82M-v1.0-ONNX";
pub const ONNX_REMOTE_PATH: &str = "onnx/model.onnx";
/// Local name of the ONNX export inside the model directory.
pub const ONNX_FILE_NAME: &str = "kokoro-v1_0.onnx";

pub fn onnx_export() -> ExternalFile {
    ExternalFile {
        repo_id: ONNX_REPO_ID.to_string(),
        remote_path: ONNX_REMOTE_PATH.to_string(),
        file_name: ONNX_FILE_NAME.to_string(),
    }
}

/// `config` with the ONNX export added to its external files, unless an
/// `.onnx` file is already listed.
pub fn with_onnx_export(config: &TtsConfig) -> TtsConfig {
    let is_onnx = |name: &str| name.ends_with(".onnx");
    let listed = config.model_files.iter().any(|f| is_onnx(f))
        || config.external_files.iter().any(|f| is_onnx(&f.file_name));

    let mut config = config.clone();
    if !listed {
        config.external_files.push(onnx_export());
    }
    config
}

/// Parameters for loading the ONNX session.
#[derive(Debug, Clone, Default)]
pub struct KokoroModelParams {
    /// CPU threads for inference. `None` uses the ORT default.
    pub num_threads: Option<usize>,
    /// Where the Level3-optimized graph is cached between loads. Must be
    /// writable.
    pub optimized_model_cache_path: Option<PathBuf>,
}

/// Builds [`KokoroPipeline`]s from a local model directory.
///
/// ```rust,no_run
/// use kokoro_nodes::config::TtsConfig;
/// use kokoro_nodes::engines::kokoro::KokoroPipelineBuilder;
/// use kokoro_nodes::pipeline::PipelineBuilder;
///
/// let builder = KokoroPipelineBuilder::from_config(&TtsConfig::default());
/// let pipeline = builder.build("a")?;
/// assert_eq!(pipeline.lang_code(), "a");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct KokoroPipelineBuilder {
    model_dir: PathBuf,
    params: KokoroModelParams,
    espeak: EspeakConfig,
}

impl KokoroPipelineBuilder {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            params: KokoroModelParams::default(),
            espeak: EspeakConfig::default(),
        }
    }

    pub fn from_config(config: &TtsConfig) -> Self {
        Self::new(config.model_dir()).with_params(KokoroModelParams {
            num_threads: config.num_threads,
            optimized_model_cache_path: config.optimized_model_cache_path.clone(),
        })
    }

    pub fn with_params(mut self, params: KokoroModelParams) -> Self {
        self.params = params;
        self
    }

    /// Use a bundled espeak-ng binary and data directory. Either may be `None`
    /// to fall back to the system install.
    pub fn with_espeak(mut self, bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        self.espeak = EspeakConfig {
            bin_path,
            data_path,
        };
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}

impl PipelineBuilder for KokoroPipelineBuilder {
    fn build(&self, lang_code: &str) -> Result<Box<dyn SynthesisPipeline>, PipelineError> {
        let espeak_lang = espeak_language(lang_code).ok_or_else(|| {
            PipelineError::with_source(
                "unsupported language",
                KokoroError::UnsupportedLanguage(lang_code.to_string()),
            )
        })?;

        let model = KokoroModel::load(
            &self.model_dir,
            self.params.num_threads,
            self.params.optimized_model_cache_path.as_deref(),
        )
        .map_err(|e| PipelineError::with_source("failed to load Kokoro model", e))?;

        log::info!("Kokoro pipeline ready for '{lang_code}' (espeak-ng voice {espeak_lang})");
        Ok(Box::new(KokoroPipeline {
            lang_code: lang_code.to_string(),
            espeak_lang,
            model,
            voices: VoiceStore::default(),
            espeak: self.espeak.clone(),
        }))
    }
}

/// Kokoro-82M running on ONNX Runtime for a single language.
pub struct KokoroPipeline {
    lang_code: String,
    espeak_lang: &'static str,
    model: KokoroModel,
    voices: VoiceStore,
    espeak: EspeakConfig,
}

impl KokoroPipeline {
    fn render(
        &mut self,
        text: &str,
        voice_id: &str,
        voice_path: &Path,
        speed: f32,
    ) -> Result<Segment, PipelineError> {
        let phonemes = phonemize(text, self.espeak_lang, self.model.vocab(), &self.espeak)
            .map_err(|e| PipelineError::with_source("phonemization failed", e))?;
        if phonemes.ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
        }

        let styles = self
            .voices
            .get_or_load(voice_id, voice_path)
            .map_err(|e| PipelineError::with_source(format!("failed to load voice {voice_id}"), e))?;

        let audio = self
            .model
            .synthesize(&phonemes.ids, styles, speed)
            .map_err(|e| PipelineError::with_source("inference failed", e))?;

        Ok(Segment {
            text: text.to_string(),
            phonemes: phonemes.ipa,
            audio,
        })
    }
}

impl SynthesisPipeline for KokoroPipeline {
    fn lang_code(&self) -> &str {
        &self.lang_code
    }

    fn generate(&mut self, request: SynthesisRequest) -> SegmentStream<'_> {
        let chunks: Vec<String> = request
            .split
            .split(&request.text)
            .map(str::to_string)
            .collect();

        Box::new(chunks.into_iter().map(move |chunk| {
            self.render(&chunk, &request.voice_id, &request.voice_path, request.speed)
        }))
    }
}
