use crate::assets::{AssetCache, HubFetcher};
use crate::audio::{normalize, AudioBuffer};
use crate::capability::SystemProbe;
use crate::catalog::VoiceCatalog;
use crate::config::TtsConfig;
use crate::error::TtsError;
use crate::pipeline::{PipelineBuilder, PipelineFactory, SplitPattern, SynthesisRequest};

use super::{InputSpec, Node, NodeInputs, NodeSchema, NodeValue, SocketKind, CATEGORY};

/// Output sample rate of every Kokoro pipeline.
pub const SAMPLE_RATE: u32 = 24000;

pub const SPEED_RANGE: (f64, f64) = (0.5, 2.0);
pub const VOLUME_RANGE: (f64, f64) = (0.1, 2.0);

/// Where the node is in its current (or last) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsState {
    Idle,
    LoadingAssets,
    Synthesizing,
    Done,
    Failed,
}

/// Text-to-speech node.
///
/// Owns the asset cache and the pipeline factory. The model files are
/// verified once per node; afterwards only voices are checked.
pub struct TextToSpeechNode {
    assets: AssetCache,
    factory: PipelineFactory,
    model_loaded: bool,
    state: TtsState,
}

impl TextToSpeechNode {
    pub const CLASS_NAME: &'static str = "KokoroTTS";
    pub const DISPLAY_NAME: &'static str = "Kokoro TTS 🔊";

    pub fn new(assets: AssetCache, factory: PipelineFactory) -> Self {
        Self {
            assets,
            factory,
            model_loaded: false,
            state: TtsState::Idle,
        }
    }

    /// Node using the hub for downloads, the system probe and the built-in
    /// voice catalog.
    pub fn from_config(config: &TtsConfig, builder: Box<dyn PipelineBuilder>) -> Self {
        let assets = AssetCache::new(
            config.model_dir(),
            config.manifest(),
            Box::new(HubFetcher::new(config.hf_token.clone())),
        );
        let factory = PipelineFactory::new(
            VoiceCatalog::builtin().clone(),
            builder,
            Box::new(SystemProbe::default()),
        );
        Self::new(assets, factory)
    }

    pub fn state(&self) -> TtsState {
        self.state
    }

    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    pub fn factory(&self) -> &PipelineFactory {
        &self.factory
    }

    /// Render `text` with the voice shown as `voice_name`, reporting every
    /// failure.
    pub fn try_synthesize(
        &mut self,
        text: &str,
        voice_name: &str,
        speed: f32,
        volume: f32,
    ) -> Result<AudioBuffer, TtsError> {
        let text = validate_text(text)?;
        self.state = TtsState::LoadingAssets;
        match self.render(text, voice_name, speed, volume) {
            Ok(audio) => {
                self.state = TtsState::Done;
                Ok(audio)
            }
            Err(e) => {
                self.state = TtsState::Failed;
                Err(e)
            }
        }
    }

    /// Host-facing synthesis. Empty text is rejected; any other failure is
    /// logged and answered with one second of silence at 16 kHz, so a broken
    /// voice never aborts the whole graph.
    pub fn synthesize(
        &mut self,
        text: &str,
        voice_name: &str,
        speed: f32,
        volume: f32,
    ) -> Result<AudioBuffer, TtsError> {
        validate_text(text)?;
        match self.try_synthesize(text, voice_name, speed, volume) {
            Ok(audio) => Ok(audio),
            Err(e) => {
                log::error!("Kokoro TTS Error: {e}");
                Ok(AudioBuffer::placeholder())
            }
        }
    }

    fn render(
        &mut self,
        text: &str,
        voice_name: &str,
        speed: f32,
        volume: f32,
    ) -> Result<AudioBuffer, TtsError> {
        let voice_id = self
            .factory
            .catalog()
            .by_display_name(voice_name)
            .map(|v| v.id.clone())
            .ok_or_else(|| TtsError::InvalidInput(format!("Unknown voice: {voice_name}")))?;

        if !self.model_loaded {
            self.assets.ensure_model()?;
            self.model_loaded = true;
        }
        let pipeline = self.factory.get_pipeline(&voice_id)?;
        let voice_path = self.assets.ensure_voice(&voice_id)?;

        self.state = TtsState::Synthesizing;
        let request = SynthesisRequest {
            text: text.to_string(),
            voice_id,
            voice_path,
            speed,
            split: SplitPattern::newlines(),
        };

        let mut samples = Vec::new();
        for segment in pipeline.generate(request) {
            let segment = segment?;
            log::debug!(
                "Rendered {} samples for {:?} ({})",
                segment.audio.len(),
                segment.text,
                segment.phonemes
            );
            samples.extend_from_slice(&segment.audio);
        }
        if samples.is_empty() {
            return Err(TtsError::EmptySynthesisResult);
        }

        normalize(&mut samples, volume);
        Ok(AudioBuffer::mono(samples, SAMPLE_RATE))
    }
}

fn validate_text(text: &str) -> Result<&str, TtsError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TtsError::InvalidInput("Text cannot be empty".to_string()));
    }
    Ok(trimmed)
}

fn clamp_socket(name: &str, value: f64, (min, max): (f64, f64)) -> f32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::debug!("{name} {value} outside {min}..={max}, using {clamped}");
    }
    clamped as f32
}

impl Node for TextToSpeechNode {
    fn schema(&self) -> NodeSchema {
        let names: Vec<String> = self
            .factory
            .catalog()
            .display_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let default_voice = names.first().cloned().unwrap_or_default();

        NodeSchema {
            class_name: Self::CLASS_NAME.to_string(),
            display_name: Self::DISPLAY_NAME.to_string(),
            category: CATEGORY.to_string(),
            inputs: vec![
                InputSpec::text("text", "")
                    .multiline()
                    .placeholder("Enter text to convert to speech"),
                InputSpec::choice("voice", names, &default_voice).tooltip("Select a voice style"),
                InputSpec::float("speed", 1.0, SPEED_RANGE.0, SPEED_RANGE.1, 0.1)
                    .optional()
                    .tooltip("Speech rate (0.5 to 2.0)"),
                InputSpec::float("volume", 1.0, VOLUME_RANGE.0, VOLUME_RANGE.1, 0.1)
                    .optional()
                    .tooltip("Audio volume"),
            ],
            return_types: vec![SocketKind::Audio],
            return_names: vec!["audio".to_string()],
            output_node: false,
        }
    }

    fn execute(&mut self, inputs: &NodeInputs) -> Result<Vec<NodeValue>, TtsError> {
        let text = inputs.text("text")?;
        let voice = inputs.text("voice")?;
        let speed = clamp_socket("speed", inputs.float("speed")?, SPEED_RANGE);
        let volume = clamp_socket("volume", inputs.float("volume")?, VOLUME_RANGE);

        let audio = self.synthesize(text, voice, speed, volume)?;
        Ok(vec![NodeValue::Audio(audio)])
    }
}

#[cfg(test)]
mod tests {
    use super::{TextToSpeechNode, TtsState, SAMPLE_RATE};
    use crate::assets::tests::{manifest, FakeFetcher};
    use crate::assets::AssetCache;
    use crate::catalog::VoiceCatalog;
    use crate::error::TtsError;
    use crate::nodes::{Node, NodeInputs, NodeValue};
    use crate::pipeline::tests::{FakeBuilder, FakeProbe};
    use crate::pipeline::PipelineFactory;
    use std::path::Path;

    struct Harness {
        node: TextToSpeechNode,
        fetcher: FakeFetcher,
        builder: FakeBuilder,
    }

    fn harness(dir: &Path, builder: FakeBuilder, fetcher: FakeFetcher) -> Harness {
        let assets = AssetCache::new(dir.join("KokoroTTS"), manifest(), Box::new(fetcher.clone()));
        let factory = PipelineFactory::new(
            VoiceCatalog::builtin().clone(),
            Box::new(builder.clone()),
            Box::new(FakeProbe::default()),
        );
        Harness {
            node: TextToSpeechNode::new(assets, factory),
            fetcher,
            builder,
        }
    }

    #[test]
    fn hello_world_is_normalized_at_24khz() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());

        let audio = h
            .node
            .try_synthesize("Hello world", "American Female 1", 1.0, 1.0)
            .unwrap();
        assert_eq!(audio.sample_rate, SAMPLE_RATE);
        assert_eq!(audio.waveform.shape(), &[1, 1, 1100]);
        assert!((audio.peak() - 1.0).abs() < 1e-4);
        assert_eq!(h.node.state(), TtsState::Done);
        assert!(h.node.model_loaded());
    }

    #[test]
    fn volume_sets_the_peak() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());
        let audio = h
            .node
            .try_synthesize("Quiet please", "American Male 1", 1.0, 0.3)
            .unwrap();
        assert!((audio.peak() - 0.3).abs() < 1e-4);
    }

    #[test]
    fn request_carries_trimmed_text_voice_and_speed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());
        h.node
            .try_synthesize("  Line one\n\nLine two  ", "British Female 1", 1.5, 1.0)
            .unwrap();

        let requests = h.builder.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].text, "Line one\n\nLine two");
        assert_eq!(requests[0].voice_id, "bf_emma");
        assert_eq!(requests[0].speed, 1.5);
        assert!(requests[0].voice_path.ends_with("voices/bf_emma.pt"));
    }

    #[test]
    fn blank_text_fails_before_any_download() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());

        let err = h.node.synthesize("  ", "American Female 1", 1.0, 1.0).unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
        assert!(h.fetcher.calls.borrow().is_empty());
        assert!(h.builder.built.borrow().is_empty());
        assert!(!tmp.path().join("KokoroTTS").exists());
        assert_eq!(h.node.state(), TtsState::Idle);
    }

    #[test]
    fn model_is_verified_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());
        h.node.try_synthesize("One", "American Female 1", 1.0, 1.0).unwrap();
        // Removing a model file goes unnoticed once the node has loaded it.
        std::fs::remove_file(tmp.path().join("KokoroTTS/config.json")).unwrap();
        h.node.try_synthesize("Two", "American Female 1", 1.0, 1.0).unwrap();
        assert_eq!(h.fetcher.calls.borrow().len(), 3);
    }

    #[test]
    fn same_language_voices_share_a_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());
        h.node.try_synthesize("One", "American Female 1", 1.0, 1.0).unwrap();
        h.node.try_synthesize("Two", "American Male 2", 1.0, 1.0).unwrap();
        assert_eq!(h.node.factory().builds(), 1);

        h.node.try_synthesize("Three", "French Female 1", 1.0, 1.0).unwrap();
        assert_eq!(h.node.factory().builds(), 2);
        assert_eq!(*h.builder.built.borrow(), vec!["a", "f"]);
    }

    #[test]
    fn empty_pipeline_output_becomes_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = FakeBuilder {
            silent: true,
            ..Default::default()
        };
        let mut h = harness(tmp.path(), builder, FakeFetcher::default());

        let err = h
            .node
            .try_synthesize("Hello", "American Female 1", 1.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, TtsError::EmptySynthesisResult));
        assert_eq!(h.node.state(), TtsState::Failed);

        let audio = h.node.synthesize("Hello", "American Female 1", 1.0, 1.0).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.waveform.shape(), &[1, 1, 16000]);
        assert_eq!(audio.peak(), 0.0);
    }

    #[test]
    fn download_failure_becomes_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher {
            failing: vec!["voices/af_heart.pt".to_string()],
            ..Default::default()
        };
        let mut h = harness(tmp.path(), FakeBuilder::default(), fetcher);

        let err = h
            .node
            .try_synthesize("Hello", "American Female 1", 1.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, TtsError::VoiceDownload { .. }));
        let audio = h.node.synthesize("Hello", "American Female 1", 1.0, 1.0).unwrap();
        assert_eq!(audio.sample_rate, 16000);
    }

    #[test]
    fn unknown_voice_name_becomes_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());
        let audio = h.node.synthesize("Hello", "Martian Robot 9", 1.0, 1.0).unwrap();
        assert_eq!(audio.sample_rate, 16000);
    }

    #[test]
    fn execute_clamps_sockets_and_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = harness(tmp.path(), FakeBuilder::default(), FakeFetcher::default());
        let inputs = NodeInputs::new()
            .with("text", NodeValue::Text("Hi".to_string()))
            .with("speed", NodeValue::Float(9.0))
            .resolve(&h.node.schema());

        let outputs = h.node.execute(&inputs).unwrap();
        let NodeValue::Audio(audio) = &outputs[0] else {
            panic!("expected audio output");
        };
        assert_eq!(audio.sample_rate, SAMPLE_RATE);
        let requests = h.builder.requests.borrow();
        assert_eq!(requests[0].speed, 2.0);
        assert_eq!(requests[0].voice_id, "af_heart");
    }
}
