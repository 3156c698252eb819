use std::fmt;
use std::path::Path;
use std::str::FromStr;

use flacenc::component::BitRepr;
use flacenc::error::Verify;
use mp3lame_encoder::{Bitrate, DualPcm, FlushNoGap, MonoPcm};

use super::AudioError;

/// Bit depth used for FLAC output.
const FLAC_BITS_PER_SAMPLE: usize = 16;

/// Container formats the save node can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 3] = [AudioFormat::Wav, AudioFormat::Mp3, AudioFormat::Flac];

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(format!("unsupported audio format '{other}'")),
        }
    }
}

/// Encode per-channel samples and write them to `path`.
///
/// `bitrate_kbps` only affects MP3; WAV and FLAC are lossless.
pub fn encode_to_file(
    path: &Path,
    channels: &[Vec<f32>],
    sample_rate: u32,
    format: AudioFormat,
    bitrate_kbps: u32,
) -> Result<(), AudioError> {
    frame_count(channels)?;
    match format {
        AudioFormat::Wav => write_wav(path, channels, sample_rate),
        AudioFormat::Mp3 => {
            let bytes = encode_mp3(channels, sample_rate, bitrate_kbps)?;
            std::fs::write(path, bytes)?;
            Ok(())
        }
        AudioFormat::Flac => {
            let bytes = encode_flac(channels, sample_rate)?;
            std::fs::write(path, bytes)?;
            Ok(())
        }
    }
}

/// Frames per channel. Every channel must hold the same number of samples.
fn frame_count(channels: &[Vec<f32>]) -> Result<usize, AudioError> {
    let Some(first) = channels.first() else {
        return Err(AudioError::Unsupported("no audio channels".to_string()));
    };
    let frames = first.len();
    if let Some(idx) = channels.iter().position(|channel| channel.len() != frames) {
        return Err(AudioError::Unsupported(format!(
            "channel {idx} has {} samples, channel 0 has {frames}",
            channels[idx].len()
        )));
    }
    Ok(frames)
}

/// 32-bit float WAV, interleaved.
pub fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> Result<(), AudioError> {
    let count = u16::try_from(channels.len())
        .map_err(|_| AudioError::Unsupported(format!("{} channels", channels.len())))?;
    let spec = hound::WavSpec {
        channels: count,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let frames = frame_count(channels)?;
    let mut writer = hound::WavWriter::create(path, spec)?;
    for idx in 0..frames {
        for channel in channels {
            writer.write_sample(channel[idx])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

fn lame_bitrate(kbps: u32) -> Result<Bitrate, AudioError> {
    let bitrate = match kbps {
        64 => Bitrate::Kbps64,
        96 => Bitrate::Kbps96,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(AudioError::Unsupported(format!("MP3 bitrate {other} kbps")));
        }
    };
    Ok(bitrate)
}

fn encode_mp3(
    channels: &[Vec<f32>],
    sample_rate: u32,
    bitrate_kbps: u32,
) -> Result<Vec<u8>, AudioError> {
    let lame_err = |e: &dyn fmt::Debug| AudioError::Encode(format!("LAME: {e:?}"));

    let mut builder = mp3lame_encoder::Builder::new()
        .ok_or_else(|| AudioError::Encode("LAME could not be initialised".to_string()))?;
    builder
        .set_num_channels(channels.len().min(2) as u8)
        .map_err(|e| lame_err(&e))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| lame_err(&e))?;
    builder
        .set_brate(lame_bitrate(bitrate_kbps)?)
        .map_err(|e| lame_err(&e))?;
    builder
        .set_quality(mp3lame_encoder::Quality::Best)
        .map_err(|e| lame_err(&e))?;
    let mut encoder = builder.build().map_err(|e| lame_err(&e))?;

    let frames = channels[0].len();
    let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(frames));
    let encoded = match channels {
        [mono] => encoder.encode_to_vec(MonoPcm(mono.as_slice()), &mut out),
        [left, right] => encoder.encode_to_vec(
            DualPcm {
                left: left.as_slice(),
                right: right.as_slice(),
            },
            &mut out,
        ),
        _ => {
            return Err(AudioError::Unsupported(format!(
                "MP3 supports at most 2 channels, got {}",
                channels.len()
            )));
        }
    };
    encoded.map_err(|e| lame_err(&e))?;

    // LAME needs up to 7200 bytes to flush its last frames.
    out.reserve(7200);
    encoder
        .flush_to_vec::<FlushNoGap>(&mut out)
        .map_err(|e| lame_err(&e))?;
    Ok(out)
}

fn encode_flac(channels: &[Vec<f32>], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let frames = channels[0].len();
    let scale = f32::from(i16::MAX);
    let mut interleaved = Vec::with_capacity(frames * channels.len());
    for idx in 0..frames {
        for channel in channels {
            interleaved.push((channel[idx].clamp(-1.0, 1.0) * scale).round() as i32);
        }
    }

    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|(_, e)| AudioError::Encode(format!("FLAC config: {e:?}")))?;
    let source = flacenc::source::MemSource::from_samples(
        &interleaved,
        channels.len(),
        FLAC_BITS_PER_SAMPLE,
        sample_rate as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| AudioError::Encode(format!("FLAC: {e:?}")))?;

    let mut sink = flacenc::bitsink::ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| AudioError::Encode(format!("FLAC: {e:?}")))?;
    Ok(sink.as_slice().to_vec())
}
