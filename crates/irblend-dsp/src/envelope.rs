//! Attack/release smoother for the blend control

use irblend_core::{ATTACK_MS, RELEASE_MS};

use crate::{Processor, ProcessorConfig};

/// One-pole attack/release smoother
///
/// Rising targets use the attack coefficient, everything else the release
/// coefficient: `value = value * coeff + target * (1 - coeff)`.
#[derive(Debug, Clone)]
pub struct EnvelopeSmoother {
    attack_ms: f64,
    release_ms: f64,
    attack_coeff: f64,
    release_coeff: f64,
    value: f64,
    sample_rate: f64,
}

impl EnvelopeSmoother {
    pub fn new(sample_rate: f64) -> Self {
        let mut smoother = Self {
            attack_ms: ATTACK_MS.default,
            release_ms: RELEASE_MS.default,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            value: 0.0,
            sample_rate,
        };
        smoother.update_coefficients();
        smoother
    }

    /// Set attack time in milliseconds (clamped to 1-500)
    pub fn set_attack(&mut self, ms: f64) {
        self.attack_ms = ATTACK_MS.clamp(ms);
        self.update_coefficients();
    }

    /// Set release time in milliseconds (clamped to 1-1000)
    pub fn set_release(&mut self, ms: f64) {
        self.release_ms = RELEASE_MS.clamp(ms);
        self.update_coefficients();
    }

    pub fn attack_ms(&self) -> f64 {
        self.attack_ms
    }

    pub fn release_ms(&self) -> f64 {
        self.release_ms
    }

    pub fn attack_coeff(&self) -> f64 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f64 {
        self.release_coeff
    }

    /// Current smoothed value
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Jump straight to a value
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Single smoothing step toward `target`
    #[inline]
    pub fn process(&mut self, target: f64) -> f64 {
        let coeff = if target > self.value {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.value = self.value * coeff + target * (1.0 - coeff);
        self.value
    }

    /// Smooth toward `target` across a block of `frames` samples
    ///
    /// Equivalent to `frames` single steps with a constant target, so the
    /// time constants hold regardless of host block size.
    #[inline]
    pub fn process_block(&mut self, target: f64, frames: usize) -> f64 {
        let coeff = if target > self.value {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        let coeff = coeff.powi(frames.min(i32::MAX as usize) as i32);
        self.value = self.value * coeff + target * (1.0 - coeff);
        self.value
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_coefficient(self.attack_ms, self.sample_rate);
        self.release_coeff = time_coefficient(self.release_ms, self.sample_rate);
    }
}

impl Processor for EnvelopeSmoother {
    fn reset(&mut self) {
        self.value = 0.0;
    }
}

impl ProcessorConfig for EnvelopeSmoother {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }
}

/// `exp(-1 / (ms * 0.001 * sr))`
#[inline]
fn time_coefficient(ms: f64, sample_rate: f64) -> f64 {
    let samples = ms * 0.001 * sample_rate;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coefficients() {
        let mut smoother = EnvelopeSmoother::new(48000.0);
        smoother.set_attack(10.0);
        assert_relative_eq!(smoother.attack_coeff(), (-1.0_f64 / 480.0).exp());

        smoother.set_sample_rate(96000.0);
        assert_relative_eq!(smoother.attack_coeff(), (-1.0_f64 / 960.0).exp());
    }

    #[test]
    fn test_time_clamping() {
        let mut smoother = EnvelopeSmoother::new(48000.0);
        smoother.set_attack(0.0);
        assert_eq!(smoother.attack_ms(), 1.0);
        smoother.set_attack(900.0);
        assert_eq!(smoother.attack_ms(), 500.0);
        smoother.set_release(0.2);
        assert_eq!(smoother.release_ms(), 1.0);
        smoother.set_release(5000.0);
        assert_eq!(smoother.release_ms(), 1000.0);
    }

    #[test]
    fn test_attack_release_asymmetry() {
        let mut smoother = EnvelopeSmoother::new(48000.0);
        smoother.set_attack(1.0);
        smoother.set_release(1000.0);

        // Rising uses the fast attack
        let risen = smoother.process_block(1.0, 480);
        assert!(risen > 0.99);

        // Falling uses the slow release
        let fallen = smoother.process_block(0.0, 480);
        assert!(fallen > 0.98);
    }

    #[test]
    fn test_block_matches_single_steps() {
        let mut a = EnvelopeSmoother::new(48000.0);
        let mut b = EnvelopeSmoother::new(48000.0);
        for _ in 0..64 {
            a.process(0.8);
        }
        b.process_block(0.8, 64);
        assert_relative_eq!(a.value(), b.value(), epsilon = 1e-12);
    }

    #[test]
    fn test_reset() {
        let mut smoother = EnvelopeSmoother::new(48000.0);
        smoother.process_block(1.0, 4800);
        smoother.reset();
        assert_eq!(smoother.value(), 0.0);
    }
}
