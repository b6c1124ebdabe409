//! Parameter types and ranges for the blend processor

use serde::{Deserialize, Serialize};

/// Parameter range specification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamRange {
    pub const fn linear(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }

    /// Clamp a value into range (NaN falls back to the default)
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Denormalize a 0-1 value to actual value
    pub fn denormalize(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        (self.clamp(value) - self.min) / (self.max - self.min)
    }
}

// ============ Host-facing ranges ============

/// Static blend: -1 = 100% IR A, +1 = 100% IR B
pub const BLEND: ParamRange = ParamRange::linear(-1.0, 1.0, 0.0);

/// Lower bound of the dynamic blend mapping
pub const LOW_BLEND: ParamRange = ParamRange::linear(-1.0, 1.0, -1.0);

/// Upper bound of the dynamic blend mapping
pub const HIGH_BLEND: ParamRange = ParamRange::linear(-1.0, 1.0, 1.0);

pub const THRESHOLD_DB: ParamRange = ParamRange::linear(-60.0, 0.0, -30.0);

pub const RANGE_DB: ParamRange = ParamRange::linear(1.0, 60.0, 20.0);

pub const KNEE_WIDTH_DB: ParamRange = ParamRange::linear(0.0, 20.0, 5.0);

pub const ATTACK_MS: ParamRange = ParamRange::linear(1.0, 500.0, 50.0);

pub const RELEASE_MS: ParamRange = ParamRange::linear(1.0, 1000.0, 200.0);

pub const OUTPUT_GAIN_DB: ParamRange = ParamRange::linear(-24.0, 24.0, 0.0);

/// Level detection mode for dynamic blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionMode {
    /// Instantaneous block peak
    #[default]
    Peak,
    /// Trailing RMS window
    Rms,
}

impl DetectionMode {
    /// Host choice index: 0 = peak, anything else = RMS
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => Self::Peak,
            _ => Self::Rms,
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Self::Peak => 0,
            Self::Rms => 1,
        }
    }
}
