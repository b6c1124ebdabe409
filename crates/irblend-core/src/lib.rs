//! irblend-core: Shared types for the IrBlend dual-IR convolution processor
//!
//! This crate provides the foundational types used across all IrBlend crates.

mod sample;
mod params;
mod error;

pub use sample::*;
pub use params::*;
pub use error::*;

/// Level reported for silent or empty input
pub const SILENCE_FLOOR_DB: f64 = -96.0;

/// Linear amplitude below which a level collapses to [`SILENCE_FLOOR_DB`]
pub const SILENCE_THRESHOLD: f64 = 1e-6;

/// Calibration applied once to every impulse response at load time
pub const IR_CALIBRATION_DB: f64 = -17.0;

/// Impulse response slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IrSlot {
    A,
    B,
}

impl IrSlot {
    pub const ALL: [IrSlot; 2] = [IrSlot::A, IrSlot::B];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            IrSlot::A => 0,
            IrSlot::B => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IrSlot::A => "A",
            IrSlot::B => "B",
        }
    }
}

impl std::fmt::Display for IrSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IR {}", self.name())
    }
}

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    /// Level of an amplitude, floored at [`SILENCE_FLOOR_DB`]
    #[inline]
    pub fn from_level(amplitude: f64) -> Self {
        if amplitude < SILENCE_THRESHOLD {
            Self(SILENCE_FLOOR_DB)
        } else {
            Self(20.0 * amplitude.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
