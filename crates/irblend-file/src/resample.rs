//! Offline sample-rate conversion for impulse responses
//!
//! Windowed-sinc (rubato `SincFixedIn`). Output length is deterministic:
//! `round(len * out / in)` with ties rounded up. `SincFixedIn` output is
//! already time-aligned with its input, so the impulse onset stays at sample 0.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

use irblend_core::{LoadError, LoadResult, Sample};

/// Input frames per resampler call
const CHUNK_SIZE: usize = 1024;

/// Extra output flushed past the target length before truncation
pub const RESAMPLE_MARGIN: usize = 64;

/// Resampler quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleQuality {
    Fast,
    #[default]
    Balanced,
    High,
}

impl ResampleQuality {
    fn parameters(self) -> SincInterpolationParameters {
        let (sinc_len, oversampling_factor, interpolation) = match self {
            Self::Fast => (64, 64, SincInterpolationType::Linear),
            Self::Balanced => (128, 128, SincInterpolationType::Cubic),
            Self::High => (256, 256, SincInterpolationType::Cubic),
        };
        SincInterpolationParameters {
            sinc_len,
            f_cutoff: 0.95,
            interpolation,
            oversampling_factor,
            window: WindowFunction::BlackmanHarris2,
        }
    }
}

/// `round(len * out_rate / in_rate)`, ties rounded up
pub fn resampled_length(len: usize, in_rate: u32, out_rate: u32) -> usize {
    if in_rate == 0 {
        return 0;
    }
    let in_rate = in_rate as u128;
    ((len as u128 * out_rate as u128 + in_rate / 2) / in_rate) as usize
}

/// Resample one channel to exactly `resampled_length` samples
pub fn resample(
    samples: &[Sample],
    in_rate: u32,
    out_rate: u32,
    quality: ResampleQuality,
) -> LoadResult<Vec<Sample>> {
    if samples.is_empty() {
        return Err(LoadError::EmptyBuffer);
    }
    if in_rate == 0 || out_rate == 0 {
        return Err(LoadError::Resample(format!(
            "invalid rate conversion {in_rate} Hz -> {out_rate} Hz"
        )));
    }
    if in_rate == out_rate {
        return Ok(samples.to_vec());
    }

    let target_len = resampled_length(samples.len(), in_rate, out_rate);
    let ratio = out_rate as f64 / in_rate as f64;

    let mut resampler = SincFixedIn::<f64>::new(ratio, 1.0, quality.parameters(), CHUNK_SIZE, 1)
        .map_err(|e| LoadError::Resample(e.to_string()))?;

    let wanted = target_len + RESAMPLE_MARGIN;
    let mut output: Vec<Sample> = Vec::with_capacity(wanted);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let chunk = resampler
            .process(&[&samples[pos..pos + n]], None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
        pos += n;
    }

    if pos < samples.len() {
        let tail: [&[f64]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the filter tail with silence
    let mut flushes = 0;
    while output.len() < wanted && flushes < 64 {
        let chunk = resampler
            .process_partial(None::<&[&[f64]]>, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
        flushes += 1;
    }

    let mut resampled: Vec<Sample> = output.into_iter().take(target_len).collect();
    // Anything the resampler did not produce is silence
    resampled.resize(target_len, 0.0);
    Ok(resampled)
}
