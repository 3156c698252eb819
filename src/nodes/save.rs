//! The save node: resolves an output path, resamples to the quality tier and
//! writes the encoded file.
//!
//! Default layout is `<output_root>/TTS/<YYYY-MM-DD>/TTS-0001.<format>`. Without
//! `overwrite`, each save takes the next free four-digit suffix.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::audio::{encode_to_file, resample, AudioBuffer, AudioError, AudioFormat};
use crate::error::TtsError;

use super::{InputSpec, Node, NodeInputs, NodeSchema, NodeValue, SocketKind, CATEGORY};

pub const DEFAULT_BASENAME: &str = "TTS";
pub const DEFAULT_FOLDER: &str = "TTS";

/// Bitrate and sample rate preset for saved audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    High,
    Medium,
    Low,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::High, Quality::Medium, Quality::Low];

    /// `(bitrate in kbps, sample rate in Hz)`.
    pub fn settings(self) -> (u32, u32) {
        match self {
            Quality::High => (320, 48000),
            Quality::Medium => (192, 44100),
            Quality::Low => (128, 32000),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Quality::High),
            "medium" => Ok(Quality::Medium),
            "low" => Ok(Quality::Low),
            other => Err(format!("unknown quality '{other}'")),
        }
    }
}

/// Where a save should go, before the numeric suffix is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    /// Folder relative to the output root.
    pub subfolder: PathBuf,
    pub basename: String,
    pub format: AudioFormat,
    pub quality: Quality,
}

impl OutputDescriptor {
    /// Interpret the user's `custom_path/filename` hint. A blank hint selects
    /// `TTS/<date>/TTS`.
    pub fn from_hint(hint: &str, format: AudioFormat, quality: Quality, date: NaiveDate) -> Self {
        let mut subfolder =
            PathBuf::from(DEFAULT_FOLDER).join(date.format("%Y-%m-%d").to_string());
        let mut basename = DEFAULT_BASENAME.to_string();

        let hint = hint.trim();
        if !hint.is_empty() {
            let hint = hint.trim_matches('/');
            let (dir, name) = hint.rsplit_once('/').unwrap_or(("", hint));
            subfolder = PathBuf::from(dir);
            if !name.is_empty() {
                basename = name.to_string();
            }
        }

        Self {
            subfolder,
            basename,
            format,
            quality,
        }
    }

    /// Highest `<basename>-<digits>.<ext>` suffix present in `dir` plus one.
    pub fn next_index(&self, dir: &Path) -> Result<u64, TtsError> {
        let pattern = Regex::new(&format!(r"^{}-(\d+)\.\w+$", regex::escape(&self.basename)))
            .map_err(|e| TtsError::InvalidInput(format!("bad file name: {e}")))?;

        if !dir.exists() {
            return Ok(1);
        }
        let mut highest = 0u64;
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(n) = pattern
                .captures(name)
                .and_then(|caps| caps[1].parse::<u64>().ok())
            {
                highest = highest.max(n);
            }
        }
        highest.checked_add(1).ok_or_else(|| {
            TtsError::InvalidInput(format!(
                "no numeric suffix left for '{}' in {}",
                self.basename,
                dir.display()
            ))
        })
    }

    /// File name for this save. With `overwrite` the name has no suffix and
    /// may replace an existing file.
    pub fn file_name(&self, dir: &Path, overwrite: bool) -> Result<String, TtsError> {
        let ext = self.format.extension();
        if overwrite {
            return Ok(format!("{}.{ext}", self.basename));
        }
        Ok(format!("{}-{:04}.{ext}", self.basename, self.next_index(dir)?))
    }
}

/// A written file, in the shape of the host's UI result entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedAudio {
    #[serde(skip)]
    pub path: PathBuf,
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

pub struct SaveAudioNode {
    output_root: PathBuf,
    date: Option<NaiveDate>,
    last_saved: Vec<SavedAudio>,
}

impl SaveAudioNode {
    pub const CLASS_NAME: &'static str = "Save_Audio";
    pub const DISPLAY_NAME: &'static str = "Save Audio 🔊";

    pub fn new(output_root: PathBuf) -> Self {
        Self {
            output_root,
            date: None,
            last_saved: Vec::new(),
        }
    }

    /// Pin the date used for the default folder instead of today.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Write `audio` and report where it went.
    pub fn try_save(
        &mut self,
        audio: &AudioBuffer,
        filepath: &str,
        format: AudioFormat,
        quality: Quality,
        overwrite: bool,
    ) -> Result<SavedAudio, TtsError> {
        let descriptor = OutputDescriptor::from_hint(filepath, format, quality, self.today());
        let dir = self.output_root.join(&descriptor.subfolder);
        fs::create_dir_all(&dir)?;

        let filename = descriptor.file_name(&dir, overwrite)?;
        let path = dir.join(&filename);
        let (bitrate, sample_rate) = quality.settings();

        write_audio(&path, audio, format, bitrate, sample_rate)
            .map_err(|source| TtsError::Encode {
                path: path.clone(),
                source,
            })?;

        log::info!("Audio saved to: {}", path.display());
        let saved = SavedAudio {
            path,
            filename,
            subfolder: descriptor.subfolder.to_string_lossy().into_owned(),
            kind: "output",
        };
        self.last_saved = vec![saved.clone()];
        Ok(saved)
    }

    /// Host-facing save. Failures are logged and reported as an empty path;
    /// the audio is passed through either way.
    pub fn save(
        &mut self,
        audio: &AudioBuffer,
        filepath: &str,
        format: AudioFormat,
        quality: Quality,
        overwrite: bool,
    ) -> (String, AudioBuffer) {
        match self.try_save(audio, filepath, format, quality, overwrite) {
            Ok(saved) => (saved.path.to_string_lossy().into_owned(), audio.clone()),
            Err(e) => {
                log::error!("Error saving audio: {e}");
                self.last_saved.clear();
                (String::new(), audio.clone())
            }
        }
    }

    pub fn last_saved(&self) -> &[SavedAudio] {
        &self.last_saved
    }
}

fn write_audio(
    path: &Path,
    audio: &AudioBuffer,
    format: AudioFormat,
    bitrate: u32,
    sample_rate: u32,
) -> Result<(), AudioError> {
    let mut channels = audio.squeeze_batch()?;
    if audio.sample_rate != sample_rate {
        channels = resample(&channels, audio.sample_rate, sample_rate)?;
    }
    encode_to_file(path, &channels, sample_rate, format, bitrate)
}

impl Node for SaveAudioNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema {
            class_name: Self::CLASS_NAME.to_string(),
            display_name: Self::DISPLAY_NAME.to_string(),
            category: CATEGORY.to_string(),
            inputs: vec![
                InputSpec::audio("audio"),
                InputSpec::text("filepath", "")
                    .multiline()
                    .placeholder("custom_path/filename")
                    .tooltip(
                        "by default, the audio will be saved to output/TTS/{date}/TTS-xxxx.{format}",
                    ),
                InputSpec::choice(
                    "format",
                    AudioFormat::ALL.iter().map(ToString::to_string).collect(),
                    AudioFormat::Mp3.extension(),
                ),
                InputSpec::choice(
                    "quality",
                    Quality::ALL.iter().map(ToString::to_string).collect(),
                    Quality::High.name(),
                ),
                InputSpec::boolean("overwrite", false),
            ],
            return_types: vec![SocketKind::String, SocketKind::Audio],
            return_names: vec!["filepath".to_string(), "audio".to_string()],
            output_node: true,
        }
    }

    fn execute(&mut self, inputs: &NodeInputs) -> Result<Vec<NodeValue>, TtsError> {
        let audio = inputs.audio("audio")?;
        let filepath = inputs.text("filepath")?;
        let format = inputs.text("format")?.parse::<AudioFormat>();
        let quality = inputs.text("quality")?.parse::<Quality>();
        let overwrite = inputs.boolean("overwrite")?;

        let (path, audio) = match (format, quality) {
            (Ok(format), Ok(quality)) => self.save(audio, filepath, format, quality, overwrite),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Error saving audio: {e}");
                self.last_saved.clear();
                (String::new(), audio.clone())
            }
        };
        Ok(vec![NodeValue::Text(path), NodeValue::Audio(audio)])
    }

    fn ui_output(&self) -> Option<serde_json::Value> {
        Some(json!({ "audio": self.last_saved }))
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputDescriptor, Quality, SaveAudioNode};
    use crate::audio::{probe_file, AudioBuffer, AudioFormat};
    use crate::nodes::{Node, NodeInputs, NodeValue};
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn speech() -> AudioBuffer {
        let samples = (0..24000)
            .map(|i| ((i as f32) * 0.04).sin() * 0.8)
            .collect();
        AudioBuffer::mono(samples, 24000)
    }

    fn node(root: &Path) -> SaveAudioNode {
        SaveAudioNode::new(root.to_path_buf()).with_date(date())
    }

    #[test]
    fn quality_table() {
        assert_eq!(Quality::High.settings(), (320, 48000));
        assert_eq!(Quality::Medium.settings(), (192, 44100));
        assert_eq!(Quality::Low.settings(), (128, 32000));
        assert_eq!("MEDIUM".parse::<Quality>(), Ok(Quality::Medium));
        assert!("ultra".parse::<Quality>().is_err());
    }

    #[test]
    fn blank_hint_uses_dated_default() {
        let d = OutputDescriptor::from_hint("  ", AudioFormat::Mp3, Quality::High, date());
        assert_eq!(d.subfolder, PathBuf::from("TTS/2026-10-18"));
        assert_eq!(d.basename, "TTS");
    }

    #[test]
    fn hint_is_split_into_folder_and_name() {
        let d = OutputDescriptor::from_hint(
            "/podcasts/episode1/intro/",
            AudioFormat::Wav,
            Quality::Low,
            date(),
        );
        assert_eq!(d.subfolder, PathBuf::from("podcasts/episode1"));
        assert_eq!(d.basename, "intro");

        let bare = OutputDescriptor::from_hint("narration", AudioFormat::Wav, Quality::Low, date());
        assert_eq!(bare.subfolder, PathBuf::from(""));
        assert_eq!(bare.basename, "narration");

        let slash = OutputDescriptor::from_hint("/", AudioFormat::Wav, Quality::Low, date());
        assert_eq!(slash.basename, "TTS");
    }

    #[test]
    fn next_index_follows_highest_existing_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["TTS-0001.mp3", "TTS-0007.wav", "TTS-x.mp3", "Other-0009.mp3", "TTS.mp3"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        let d = OutputDescriptor::from_hint("", AudioFormat::Flac, Quality::High, date());
        assert_eq!(d.next_index(tmp.path()).unwrap(), 8);
        assert_eq!(d.file_name(tmp.path(), false).unwrap(), "TTS-0008.flac");
        assert_eq!(d.file_name(tmp.path(), true).unwrap(), "TTS.flac");
    }

    #[test]
    fn exhausted_suffix_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(format!("TTS-{}.mp3", u64::MAX)), b"").unwrap();
        let d = OutputDescriptor::from_hint("", AudioFormat::Mp3, Quality::High, date());
        assert!(matches!(
            d.next_index(tmp.path()),
            Err(crate::error::TtsError::InvalidInput(_))
        ));
    }

    #[test]
    fn exhausted_suffix_save_returns_empty_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("TTS/2026-10-18");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("TTS-{}.wav", u64::MAX)), b"").unwrap();

        let mut node = node(tmp.path());
        let (path, audio) = node.save(&speech(), "", AudioFormat::Wav, Quality::High, false);
        assert_eq!(path, "");
        assert_eq!(audio, speech());
        assert!(node.last_saved().is_empty());
    }

    #[test]
    fn basename_is_matched_literally() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a+b-0004.wav"), b"").unwrap();
        std::fs::write(tmp.path().join("aab-0009.wav"), b"").unwrap();
        let d = OutputDescriptor::from_hint("a+b", AudioFormat::Wav, Quality::High, date());
        assert_eq!(d.next_index(tmp.path()).unwrap(), 5);
    }

    #[test]
    fn repeated_saves_get_increasing_suffixes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());
        let audio = speech();

        let first = node.save(&audio, "", AudioFormat::Mp3, Quality::High, false).0;
        let second = node.save(&audio, "", AudioFormat::Mp3, Quality::High, false).0;
        let third = node.save(&audio, "", AudioFormat::Mp3, Quality::High, false).0;

        let dir = tmp.path().join("TTS/2026-10-18");
        assert_eq!(PathBuf::from(first), dir.join("TTS-0001.mp3"));
        assert_eq!(PathBuf::from(second), dir.join("TTS-0002.mp3"));
        assert_eq!(PathBuf::from(third), dir.join("TTS-0003.mp3"));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 3);
    }

    #[test]
    fn overwrite_replaces_the_same_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());

        let short = AudioBuffer::mono(vec![0.1; 4800], 48000);
        let long = AudioBuffer::mono(vec![0.1; 48000], 48000);
        let first = node.save(&long, "take", AudioFormat::Wav, Quality::High, true).0;
        let size_long = std::fs::metadata(&first).unwrap().len();
        let second = node.save(&short, "take", AudioFormat::Wav, Quality::High, true).0;
        let size_short = std::fs::metadata(&second).unwrap().len();

        assert_eq!(first, second);
        assert_eq!(PathBuf::from(&first), tmp.path().join("take.wav"));
        assert!(size_short < size_long);
    }

    #[test]
    fn saved_file_uses_tier_rate_without_batch_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());
        for (format, quality) in [
            (AudioFormat::Wav, Quality::High),
            (AudioFormat::Flac, Quality::Medium),
            (AudioFormat::Mp3, Quality::Low),
        ] {
            let saved = node
                .try_save(&speech(), "roundtrip/clip", format, quality, false)
                .unwrap();
            let info = probe_file(&saved.path).unwrap();
            assert_eq!(info.sample_rate, quality.settings().1, "{format}");
            assert_eq!(info.channels, 1, "{format}");
        }
    }

    #[test]
    fn wav_at_tier_rate_is_written_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());
        let audio = AudioBuffer::mono(vec![0.25, -0.5, 0.75], 48000);
        let saved = node
            .try_save(&audio, "exact", AudioFormat::Wav, Quality::High, true)
            .unwrap();
        let mut reader = hound::WavReader::open(&saved.path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0.25, -0.5, 0.75]);
    }

    #[test]
    fn failures_return_empty_path_and_original_audio() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());
        let batched = AudioBuffer::new(ndarray::Array3::zeros((2, 1, 100)), 24000);

        let (path, audio) = node.save(&batched, "", AudioFormat::Wav, Quality::High, false);
        assert_eq!(path, "");
        assert_eq!(audio, batched);
        assert!(node.last_saved().is_empty());
    }

    #[test]
    fn unwritable_directory_is_swallowed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("blocker"), b"file, not a folder").unwrap();
        let mut node = node(tmp.path());
        let (path, _) = node.save(&speech(), "blocker/clip", AudioFormat::Wav, Quality::High, false);
        assert_eq!(path, "");
    }

    #[test]
    fn execute_reports_ui_result() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());
        let inputs = NodeInputs::new()
            .with("audio", NodeValue::Audio(speech()))
            .with("format", NodeValue::Text("wav".to_string()))
            .resolve(&node.schema());

        let outputs = node.execute(&inputs).unwrap();
        let NodeValue::Text(path) = &outputs[0] else {
            panic!("expected a path");
        };
        assert!(path.ends_with("TTS-0001.wav"));
        assert!(matches!(outputs[1], NodeValue::Audio(_)));

        let ui = node.ui_output().unwrap();
        assert_eq!(ui["audio"][0]["filename"], "TTS-0001.wav");
        assert_eq!(ui["audio"][0]["subfolder"], "TTS/2026-10-18");
        assert_eq!(ui["audio"][0]["type"], "output");
    }

    #[test]
    fn execute_passes_audio_through_on_unknown_format_or_quality() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = node(tmp.path());
        for (format, quality) in [("ogg", "high"), ("wav", "ultra")] {
            let inputs = NodeInputs::new()
                .with("audio", NodeValue::Audio(speech()))
                .with("format", NodeValue::Text(format.to_string()))
                .with("quality", NodeValue::Text(quality.to_string()))
                .resolve(&node.schema());

            let outputs = node.execute(&inputs).unwrap();
            assert_eq!(outputs[0], NodeValue::Text(String::new()));
            assert_eq!(outputs[1], NodeValue::Audio(speech()));
            assert!(node.last_saved().is_empty());
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
