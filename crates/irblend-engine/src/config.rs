//! Processor configuration and host parameter snapshot

use serde::{Deserialize, Serialize};

use irblend_core::{
    ATTACK_MS, BLEND, DetectionMode, HIGH_BLEND, IR_CALIBRATION_DB, KNEE_WIDTH_DB, LOW_BLEND,
    OUTPUT_GAIN_DB, RANGE_DB, RELEASE_MS, THRESHOLD_DB,
};
use irblend_dsp::convolution::{DEFAULT_PARTITION_SIZE, MAX_PARTITION_SIZE, MIN_PARTITION_SIZE};
use irblend_dsp::level::DEFAULT_RMS_WINDOW_MS;
use irblend_file::ResampleQuality;

/// Supported host sample-rate range in Hz
pub const MIN_SAMPLE_RATE: f64 = 8000.0;
pub const MAX_SAMPLE_RATE: f64 = 384000.0;

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Static processor configuration
///
/// Changing any of these reallocates buffers, so they are fixed at
/// construction. The sample rate can still change later through
/// `ProcessorConfig::set_sample_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial sample rate in Hz
    pub sample_rate: f64,
    /// Largest block handed to a convolution engine at once
    pub max_block_size: usize,
    /// Convolution partition size (also the per-path latency)
    pub partition_size: usize,
    /// Trailing RMS window for level detection
    pub rms_window_ms: f64,
    /// Gain applied to every impulse response at load time
    pub calibration_db: f64,
    /// Resampler preset for impulse rate conversion
    pub resample_quality: ResampleQuality,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_size: 8192,
            partition_size: DEFAULT_PARTITION_SIZE,
            rms_window_ms: DEFAULT_RMS_WINDOW_MS,
            calibration_db: IR_CALIBRATION_DB,
            resample_quality: ResampleQuality::Balanced,
        }
    }
}

impl EngineConfig {
    /// Config for minimum latency
    pub fn low_latency() -> Self {
        Self {
            max_block_size: 1024,
            partition_size: MIN_PARTITION_SIZE,
            ..Self::default()
        }
    }

    /// Config trading latency for lower CPU on long impulses
    pub fn efficient() -> Self {
        Self {
            partition_size: 1024,
            resample_quality: ResampleQuality::High,
            ..Self::default()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_partition_size(mut self, partition_size: usize) -> Self {
        self.partition_size = partition_size;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    /// Copy with every field forced into its supported range
    pub fn validated(self) -> Self {
        let sample_rate = if self.sample_rate.is_finite() {
            self.sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
        } else {
            Self::default().sample_rate
        };
        let rms_window_ms = if self.rms_window_ms.is_finite() && self.rms_window_ms > 0.0 {
            self.rms_window_ms.min(1000.0)
        } else {
            DEFAULT_RMS_WINDOW_MS
        };
        let calibration_db = if self.calibration_db.is_finite() {
            self.calibration_db.clamp(-60.0, 24.0)
        } else {
            IR_CALIBRATION_DB
        };

        Self {
            sample_rate,
            max_block_size: self.max_block_size.clamp(16, 65536),
            partition_size: self
                .partition_size
                .clamp(MIN_PARTITION_SIZE, MAX_PARTITION_SIZE)
                .next_power_of_two(),
            rms_window_ms,
            calibration_db,
            resample_quality: self.resample_quality,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLEND SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of every host-facing parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    pub blend: f64,
    pub low_blend: f64,
    pub high_blend: f64,
    pub threshold_db: f64,
    pub range_db: f64,
    pub knee_width_db: f64,
    pub detection_mode: DetectionMode,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub output_gain_db: f64,
    pub ir_a_enabled: bool,
    pub ir_b_enabled: bool,
    pub dynamic_mode: bool,
    pub sidechain: bool,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            blend: BLEND.default,
            low_blend: LOW_BLEND.default,
            high_blend: HIGH_BLEND.default,
            threshold_db: THRESHOLD_DB.default,
            range_db: RANGE_DB.default,
            knee_width_db: KNEE_WIDTH_DB.default,
            detection_mode: DetectionMode::Peak,
            attack_ms: ATTACK_MS.default,
            release_ms: RELEASE_MS.default,
            output_gain_db: OUTPUT_GAIN_DB.default,
            ir_a_enabled: true,
            ir_b_enabled: true,
            dynamic_mode: false,
            sidechain: false,
        }
    }
}
