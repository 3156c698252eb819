use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioError;

/// Resample every channel from `from_rate` to `to_rate`.
///
/// The whole clip is processed as one chunk. The filter delay is trimmed from
/// the front and the result is cut to `ceil(frames * to_rate / from_rate)`.
pub fn resample(
    channels: &[Vec<f32>],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    let frames = channels.first().map_or(0, Vec::len);
    if from_rate == to_rate || frames == 0 {
        return Ok(channels.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid sample rates {from_rate} -> {to_rate}"
        )));
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let expected = (frames as f64 * ratio).ceil() as usize;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, frames, channels.len())
        .map_err(|e| AudioError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut output = resampler
        .process(channels, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    // Flush the filter tail until the delayed signal is fully out.
    while output[0].len() < delay + expected {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if tail[0].is_empty() {
            break;
        }
        for (channel, rest) in output.iter_mut().zip(tail) {
            channel.extend(rest);
        }
    }

    for channel in &mut output {
        channel.drain(..delay.min(channel.len()));
        channel.resize(expected, 0.0);
    }
    Ok(output)
}
