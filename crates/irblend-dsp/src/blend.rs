//! Blend curve and crossfade gain laws
//!
//! Blend values live in [-1, 1]: -1 is all IR A, +1 is all IR B.
//!
//! The dynamic curve maps a detected level onto a position in [0, 1] with a
//! soft knee around the threshold, then onto the user's low/high blend
//! bounds. The gain law turns a blend into per-path gains: equal-power when
//! both paths run, linear against the dry signal when only one does.

use serde::{Deserialize, Serialize};

use irblend_core::{HIGH_BLEND, KNEE_WIDTH_DB, LOW_BLEND, RANGE_DB, THRESHOLD_DB};

// ============ Blend Curve ============

/// Soft-knee level-to-blend mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendCurve {
    threshold_db: f64,
    range_db: f64,
    knee_width_db: f64,
    low_blend: f64,
    high_blend: f64,
}

impl Default for BlendCurve {
    fn default() -> Self {
        Self {
            threshold_db: THRESHOLD_DB.default,
            range_db: RANGE_DB.default,
            knee_width_db: KNEE_WIDTH_DB.default,
            low_blend: LOW_BLEND.default,
            high_blend: HIGH_BLEND.default,
        }
    }
}

impl BlendCurve {
    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = THRESHOLD_DB.clamp(db);
    }

    pub fn set_range(&mut self, db: f64) {
        self.range_db = RANGE_DB.clamp(db);
    }

    pub fn set_knee_width(&mut self, db: f64) {
        self.knee_width_db = KNEE_WIDTH_DB.clamp(db);
    }

    pub fn set_low_blend(&mut self, blend: f64) {
        self.low_blend = LOW_BLEND.clamp(blend);
    }

    pub fn set_high_blend(&mut self, blend: f64) {
        self.high_blend = HIGH_BLEND.clamp(blend);
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    pub fn range_db(&self) -> f64 {
        self.range_db
    }

    pub fn knee_width_db(&self) -> f64 {
        self.knee_width_db
    }

    pub fn low_blend(&self) -> f64 {
        self.low_blend
    }

    pub fn high_blend(&self) -> f64 {
        self.high_blend
    }

    /// Position in [0, 1] for a detected level
    pub fn position(&self, level_db: f64) -> f64 {
        let knee = self.knee_width_db;
        let half_knee = knee / 2.0;
        let knee_start = self.threshold_db - half_knee;
        let knee_end = self.threshold_db + half_knee;

        if level_db <= knee_start {
            0.0
        } else if level_db >= knee_end && level_db >= self.threshold_db + self.range_db {
            1.0
        } else if level_db < knee_end {
            // Quadratic knee, reaches 0.5 at knee_end
            let x = (level_db - knee_start) / knee;
            x * x / 2.0
        } else {
            let above_knee = level_db - knee_end;
            let effective_range = self.range_db - half_knee;
            let knee_contribution = if knee > 0.0 { 0.5 } else { 0.0 };
            (knee_contribution + above_knee / effective_range * (1.0 - knee_contribution)).min(1.0)
        }
    }

    /// Target blend for a detected level
    pub fn compute(&self, level_db: f64) -> f64 {
        let position = self.position(level_db);
        self.low_blend + (self.high_blend - self.low_blend) * position
    }
}

// ============ Gain Law ============

/// Per-block path gains
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendGains {
    /// Gain on IR A's engine output
    pub a: f64,
    /// Gain on IR B's engine output
    pub b: f64,
    /// Gain on the latency-aligned dry input
    pub dry: f64,
}

impl BlendGains {
    pub const PASSTHROUGH: Self = Self { a: 0.0, b: 0.0, dry: 1.0 };

    /// Gains for a blend in [-1, 1] given which paths are active
    pub fn for_paths(blend: f64, has_a: bool, has_b: bool) -> Self {
        let norm = (blend.clamp(-1.0, 1.0) + 1.0) * 0.5;
        match (has_a, has_b) {
            (true, true) => Self {
                a: (1.0 - norm).sqrt(),
                b: norm.sqrt(),
                dry: 0.0,
            },
            (true, false) => Self {
                a: 1.0 - norm,
                b: 0.0,
                dry: norm,
            },
            (false, true) => Self {
                a: 0.0,
                b: norm,
                dry: 1.0 - norm,
            },
            (false, false) => Self::PASSTHROUGH,
        }
    }
}
