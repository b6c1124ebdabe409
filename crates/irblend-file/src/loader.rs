//! Impulse response loader
//!
//! Decodes an IR file once, keeps the calibrated samples at their native
//! rate, and derives engine-ready buffers for whatever rate the processor
//! runs at. Re-deriving after a sample-rate change never touches the disk.

use std::path::{Path, PathBuf};

use irblend_core::{Decibels, IR_CALIBRATION_DB, LoadError, LoadResult, Sample};
use irblend_dsp::ImpulseBuffer;
use irblend_dsp::convolution::ENGINE_CHANNELS;

use crate::{ResampleQuality, read_audio, resample, resampled_length};

/// Zero tail appended to every engine buffer (minimum engine block)
pub const MIN_ENGINE_BLOCK: usize = 64;

/// Longest impulse accepted, in seconds at the target rate
pub const MAX_IMPULSE_SECONDS: f64 = 30.0;

// ═══════════════════════════════════════════════════════════════════════════════
// DECODED IMPULSE
// ═══════════════════════════════════════════════════════════════════════════════

/// Calibrated impulse response at its native rate
#[derive(Debug, Clone)]
pub struct DecodedImpulse {
    /// One channel (mono) or two (independent L/R)
    pub channels: Vec<Vec<Sample>>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Channel count as decoded, before reduction
    pub source_channels: usize,
    /// Source file (empty for in-memory impulses)
    pub path: PathBuf,
}

impl DecodedImpulse {
    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Summary returned by a successful load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadInfo {
    pub sample_rate: u32,
    pub num_samples: usize,
    pub num_channels: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPULSE LOADER
// ═══════════════════════════════════════════════════════════════════════════════

/// Decodes, calibrates and resamples one impulse response slot
#[derive(Debug, Clone)]
pub struct ImpulseLoader {
    impulse: Option<DecodedImpulse>,
    quality: ResampleQuality,
    calibration_db: f64,
}

impl Default for ImpulseLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImpulseLoader {
    pub fn new() -> Self {
        Self {
            impulse: None,
            quality: ResampleQuality::default(),
            calibration_db: IR_CALIBRATION_DB,
        }
    }

    pub fn with_quality(mut self, quality: ResampleQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_calibration_db(mut self, db: f64) -> Self {
        self.calibration_db = db;
        self
    }

    /// Decode an IR file, replacing the current impulse only on success
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> LoadResult<LoadInfo> {
        let path = path.as_ref();
        let data = read_audio(path)?;
        self.load_from_samples(data.channels, data.sample_rate, path)
    }

    /// Install already-decoded channels as if read from `path`
    pub fn load_from_samples<P: AsRef<Path>>(
        &mut self,
        channels: Vec<Vec<Sample>>,
        sample_rate: u32,
        path: P,
    ) -> LoadResult<LoadInfo> {
        let source_channels = channels.len();
        if source_channels == 0 {
            return Err(LoadError::Decode("file has no audio channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(LoadError::Decode("file declares a 0 Hz sample rate".to_string()));
        }

        // 1 channel as-is, 2 kept as independent L/R, more: first only
        let mut channels = channels;
        if source_channels > 2 {
            channels.truncate(1);
        }

        let num_samples = channels[0].len();
        if num_samples == 0 {
            return Err(LoadError::Decode("file contains no audio frames".to_string()));
        }
        if channels.iter().any(|ch| ch.len() != num_samples) {
            return Err(LoadError::Decode("channels differ in length".to_string()));
        }

        let gain = Decibels(self.calibration_db).to_gain();
        for channel in &mut channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }

        let info = LoadInfo {
            sample_rate,
            num_samples,
            num_channels: source_channels,
        };

        log::info!(
            "ImpulseLoader: loaded {} ({} ch, {} samples @ {} Hz)",
            path.as_ref().display(),
            source_channels,
            num_samples,
            sample_rate
        );

        self.impulse = Some(DecodedImpulse {
            channels,
            sample_rate,
            source_channels,
            path: path.as_ref().to_path_buf(),
        });

        Ok(info)
    }

    /// Engine-ready buffer at `target_rate`
    ///
    /// Always two channels: a mono impulse is duplicated. Every channel
    /// carries a [`MIN_ENGINE_BLOCK`] zero tail past the (resampled) data.
    pub fn resample_and_initialize(&self, target_rate: f64) -> LoadResult<ImpulseBuffer> {
        let impulse = self.impulse.as_ref().ok_or(LoadError::EmptyBuffer)?;

        if !(target_rate.is_finite() && target_rate >= 1.0 && target_rate <= u32::MAX as f64) {
            return Err(LoadError::Resample(format!("invalid target rate {target_rate}")));
        }
        let target = target_rate.round() as u32;

        let data_len = resampled_length(impulse.num_samples(), impulse.sample_rate, target);
        let max_len = (MAX_IMPULSE_SECONDS * target as f64) as usize;
        let total_len = data_len
            .checked_add(MIN_ENGINE_BLOCK)
            .filter(|_| data_len <= max_len)
            .ok_or(LoadError::EngineAllocation(data_len))?;

        let mut channels = Vec::with_capacity(ENGINE_CHANNELS);
        for source in &impulse.channels {
            let mut channel: Vec<Sample> = Vec::new();
            channel
                .try_reserve_exact(total_len)
                .map_err(|_| LoadError::EngineAllocation(total_len))?;

            if impulse.sample_rate == target {
                channel.extend_from_slice(source);
            } else {
                channel.extend(resample(source, impulse.sample_rate, target, self.quality)?);
            }
            channel.resize(total_len, 0.0);
            channels.push(channel);
        }

        if channels.len() < ENGINE_CHANNELS {
            let first = channels[0].clone();
            channels.push(first);
        }

        if impulse.sample_rate != target {
            log::debug!(
                "ImpulseLoader: resampled {} Hz -> {} Hz ({} -> {} samples)",
                impulse.sample_rate,
                target,
                impulse.num_samples(),
                data_len
            );
        }

        Ok(ImpulseBuffer::new(channels, target as f64))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn is_loaded(&self) -> bool {
        self.impulse.is_some()
    }

    pub fn impulse(&self) -> Option<&DecodedImpulse> {
        self.impulse.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.impulse.as_ref().map(|ir| ir.path.as_path())
    }

    /// Native sample rate (0 before a load)
    pub fn native_sample_rate(&self) -> u32 {
        self.impulse.as_ref().map_or(0, |ir| ir.sample_rate)
    }

    /// Samples per channel at the native rate
    pub fn num_samples(&self) -> usize {
        self.impulse.as_ref().map_or(0, DecodedImpulse::num_samples)
    }

    /// Channel count as decoded
    pub fn num_channels(&self) -> usize {
        self.impulse.as_ref().map_or(0, |ir| ir.source_channels)
    }

    pub fn quality(&self) -> ResampleQuality {
        self.quality
    }

    /// Forget the decoded impulse
    pub fn clear(&mut self) {
        self.impulse = None;
    }
}
