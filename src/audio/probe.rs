//! Reads sample rate and channel count back from written files.

use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::{CODEC_TYPE_FLAC, CODEC_TYPE_MP3};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioError, AudioFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Probe the container and report the default track's stream parameters.
/// Every PCM codec is reported as WAV.
pub fn probe_file(path: &Path) -> Result<AudioInfo, AudioError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let track = probed
        .format
        .default_track()
        .ok_or_else(|| AudioError::Unsupported("no default track".to_string()))?;

    let params = &track.codec_params;
    let format = match params.codec {
        CODEC_TYPE_MP3 => AudioFormat::Mp3,
        CODEC_TYPE_FLAC => AudioFormat::Flac,
        _ => AudioFormat::Wav,
    };
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| AudioError::Unsupported("no sample rate".to_string()))?;
    let channel_count = params
        .channels
        .ok_or_else(|| AudioError::Unsupported("no channel layout".to_string()))?
        .count();
    let channels = u16::try_from(channel_count)
        .map_err(|_| AudioError::Unsupported(format!("{channel_count} channels")))?;

    Ok(AudioInfo {
        format,
        sample_rate,
        channels,
    })
}
