//! Synthesis pipelines and the factory that keeps one alive per language.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::capability::{requirement_for, Availability, CapabilityProbe, Severity};
use crate::catalog::VoiceCatalog;
use crate::error::{PipelineError, TtsError};

/// One unit of pipeline output: the text chunk, its phoneme form and the
/// audio rendered for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub phonemes: String,
    pub audio: Vec<f32>,
}

/// Rule used to cut input text into independently synthesized chunks.
#[derive(Debug, Clone)]
pub struct SplitPattern(Regex);

impl SplitPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self(Regex::new(pattern)?))
    }

    /// Split on runs of one or more newlines.
    pub fn newlines() -> Self {
        static NEWLINES: OnceLock<Regex> = OnceLock::new();
        Self(
            NEWLINES
                .get_or_init(|| Regex::new(r"\n+").expect("valid regex"))
                .clone(),
        )
    }

    /// Non-blank chunks of `text`, trimmed.
    pub fn split<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .split(text)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
    }
}

/// Everything a pipeline needs to render one request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    /// Local voice asset, as returned by [`AssetCache::ensure_voice`](crate::assets::AssetCache::ensure_voice).
    pub voice_path: PathBuf,
    pub speed: f32,
    pub split: SplitPattern,
}

/// Lazy, single-pass stream of segments.
pub type SegmentStream<'a> = Box<dyn Iterator<Item = Result<Segment, PipelineError>> + 'a>;

/// A language-specific text-to-waveform pipeline.
pub trait SynthesisPipeline {
    /// Language code this pipeline was built for.
    fn lang_code(&self) -> &str;

    /// Start rendering `request`. Segments are produced in text order as the
    /// stream is consumed.
    fn generate(&mut self, request: SynthesisRequest) -> SegmentStream<'_>;
}

/// Constructs pipelines for a language code.
pub trait PipelineBuilder {
    fn build(&self, lang_code: &str) -> Result<Box<dyn SynthesisPipeline>, PipelineError>;
}

/// Holds at most one live pipeline and rebuilds it when the requested
/// language changes.
pub struct PipelineFactory {
    catalog: VoiceCatalog,
    builder: Box<dyn PipelineBuilder>,
    probe: Box<dyn CapabilityProbe>,
    current: Option<Box<dyn SynthesisPipeline>>,
    builds: usize,
}

impl PipelineFactory {
    pub fn new(
        catalog: VoiceCatalog,
        builder: Box<dyn PipelineBuilder>,
        probe: Box<dyn CapabilityProbe>,
    ) -> Self {
        Self {
            catalog,
            builder,
            probe,
            current: None,
            builds: 0,
        }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    pub fn current_lang_code(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.lang_code())
    }

    /// Number of pipelines constructed so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Pipeline for the language of `voice_id`, reusing the live one when the
    /// language matches.
    pub fn get_pipeline(&mut self, voice_id: &str) -> Result<&mut dyn SynthesisPipeline, TtsError> {
        let lang_code = self
            .catalog
            .lang_code(voice_id)
            .ok_or_else(|| TtsError::InvalidInput(format!("Unknown voice: {voice_id}")))?
            .to_string();

        self.check_requirements(&lang_code)?;

        let pipeline = match self.current.take() {
            Some(live) if live.lang_code() == lang_code => live,
            previous => match self.builder.build(&lang_code) {
                Ok(fresh) => {
                    log::debug!("Built pipeline for language '{lang_code}'");
                    self.builds += 1;
                    fresh
                }
                Err(source) => {
                    log::error!("Error creating pipeline for language {lang_code}: {source}");
                    self.current = previous;
                    return Err(TtsError::PipelineConstruction { lang_code, source });
                }
            },
        };

        Ok(&mut **self.current.insert(pipeline))
    }

    fn check_requirements(&self, lang_code: &str) -> Result<(), TtsError> {
        let Some(requirement) = requirement_for(lang_code) else {
            return Ok(());
        };
        let reason = match self.probe.probe(&requirement.dependency) {
            Availability::Available => return Ok(()),
            Availability::Missing(reason) => reason,
        };

        match requirement.severity {
            Severity::Fatal => Err(TtsError::MissingOptionalDependency(format!(
                "\n=== {} Voice Support Required ({reason}) ===\n\
                 Japanese and Chinese voices need CJK text normalization. To use them:\n\
                 1. Install espeak-ng together with its language data\n\
                 2. Check that `espeak-ng --voices=ja` and `espeak-ng --voices=cmn` list the language\n\
                 3. Restart the host application\n\
                 ================================",
                requirement.language
            ))),
            Severity::Advisory => {
                log::warn!(
                    "espeak-ng not installed ({reason}). Some {} words might not be pronounced correctly.\n\
                     To install espeak-ng:\n\
                     - Windows: Download from https://github.com/espeak-ng/espeak-ng/releases\n\
                     - Linux: sudo apt-get install espeak-ng\n\
                     - MacOS: brew install espeak",
                    requirement.language
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        PipelineBuilder, PipelineFactory, Segment, SegmentStream, SplitPattern, SynthesisPipeline,
        SynthesisRequest,
    };
    use crate::capability::{Availability, CapabilityProbe, Dependency};
    use crate::catalog::VoiceCatalog;
    use crate::error::{PipelineError, TtsError};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Renders every chunk as a ramp whose length is 100 samples per character.
    pub(crate) struct FakePipeline {
        pub lang_code: String,
        pub requests: Rc<RefCell<Vec<SynthesisRequest>>>,
        pub silent: bool,
    }

    impl SynthesisPipeline for FakePipeline {
        fn lang_code(&self) -> &str {
            &self.lang_code
        }

        fn generate(&mut self, request: SynthesisRequest) -> SegmentStream<'_> {
            self.requests.borrow_mut().push(request.clone());
            if self.silent {
                return Box::new(std::iter::empty());
            }
            let chunks: Vec<String> = request
                .split
                .split(&request.text)
                .map(str::to_string)
                .collect();
            Box::new(chunks.into_iter().map(|text| {
                let n = text.chars().count() * 100;
                let audio = (0..n).map(|i| (i as f32 / n as f32) * 0.4 - 0.2).collect();
                Ok(Segment {
                    phonemes: text.to_lowercase(),
                    text,
                    audio,
                })
            }))
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeBuilder {
        pub built: Rc<RefCell<Vec<String>>>,
        pub requests: Rc<RefCell<Vec<SynthesisRequest>>>,
        pub fail: bool,
        pub silent: bool,
    }

    impl PipelineBuilder for FakeBuilder {
        fn build(&self, lang_code: &str) -> Result<Box<dyn SynthesisPipeline>, PipelineError> {
            if self.fail {
                return Err(PipelineError::new("weights are corrupt"));
            }
            self.built.borrow_mut().push(lang_code.to_string());
            Ok(Box::new(FakePipeline {
                lang_code: lang_code.to_string(),
                requests: Rc::clone(&self.requests),
                silent: self.silent,
            }))
        }
    }

    /// Reports every dependency as missing or present and counts probes.
    #[derive(Clone, Default)]
    pub(crate) struct FakeProbe {
        pub missing: bool,
        pub probes: Rc<Cell<usize>>,
    }

    impl CapabilityProbe for FakeProbe {
        fn probe(&self, _dependency: &Dependency) -> Availability {
            self.probes.set(self.probes.get() + 1);
            if self.missing {
                Availability::Missing("not installed".to_string())
            } else {
                Availability::Available
            }
        }
    }

    fn factory(builder: &FakeBuilder, probe: &FakeProbe) -> PipelineFactory {
        PipelineFactory::new(
            VoiceCatalog::builtin().clone(),
            Box::new(builder.clone()),
            Box::new(probe.clone()),
        )
    }

    #[test]
    fn same_language_reuses_pipeline() {
        let builder = FakeBuilder::default();
        let mut factory = factory(&builder, &FakeProbe::default());

        factory.get_pipeline("af_heart").unwrap();
        factory.get_pipeline("am_adam").unwrap();
        assert_eq!(factory.builds(), 1);
        assert_eq!(factory.current_lang_code(), Some("a"));
    }

    #[test]
    fn language_switch_rebuilds_pipeline() {
        let builder = FakeBuilder::default();
        let mut factory = factory(&builder, &FakeProbe::default());

        factory.get_pipeline("af_heart").unwrap();
        factory.get_pipeline("bf_emma").unwrap();
        factory.get_pipeline("af_bella").unwrap();
        assert_eq!(*builder.built.borrow(), vec!["a", "b", "a"]);
        assert_eq!(factory.current_lang_code(), Some("a"));
    }

    #[test]
    fn missing_cjk_support_is_fatal() {
        let builder = FakeBuilder::default();
        let probe = FakeProbe {
            missing: true,
            ..Default::default()
        };
        let mut factory = factory(&builder, &probe);

        let err = factory.get_pipeline("jf_alpha").err().unwrap();
        assert!(matches!(err, TtsError::MissingOptionalDependency(_)));
        let message = err.to_string();
        assert!(message.contains("Japanese"));
        assert!(message.contains("Chinese"));
        assert!(builder.built.borrow().is_empty());
    }

    #[test]
    fn missing_espeak_only_warns() {
        let builder = FakeBuilder::default();
        let probe = FakeProbe {
            missing: true,
            ..Default::default()
        };
        let mut factory = factory(&builder, &probe);

        let pipeline = factory.get_pipeline("ff_siwis").unwrap();
        assert_eq!(pipeline.lang_code(), "f");
        assert_eq!(probe.probes.get(), 1);
    }

    #[test]
    fn english_skips_probing() {
        let probe = FakeProbe::default();
        let mut factory = factory(&FakeBuilder::default(), &probe);
        factory.get_pipeline("af_heart").unwrap();
        assert_eq!(probe.probes.get(), 0);
    }

    #[test]
    fn build_failure_keeps_previous_pipeline() {
        let mut builder = FakeBuilder::default();
        let mut factory = factory(&builder, &FakeProbe::default());
        factory.get_pipeline("af_heart").unwrap();

        builder.fail = true;
        factory.builder = Box::new(builder);
        let err = factory.get_pipeline("bf_emma").err().unwrap();
        assert!(
            matches!(err, TtsError::PipelineConstruction { ref lang_code, .. } if lang_code == "b")
        );
        assert_eq!(factory.current_lang_code(), Some("a"));
    }

    #[test]
    fn unknown_voice_is_invalid_input() {
        let mut factory = factory(&FakeBuilder::default(), &FakeProbe::default());
        let err = factory.get_pipeline("xx_missing").err().unwrap();
        assert!(matches!(err, TtsError::InvalidInput(_)));
    }

    #[test]
    fn newline_runs_split_text() {
        let split = SplitPattern::newlines();
        let chunks: Vec<&str> = split.split("First line\n\n\nSecond line\n  \nThird").collect();
        assert_eq!(chunks, vec!["First line", "Second line", "Third"]);
    }
}
