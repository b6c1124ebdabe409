//! Sample types and block helpers

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Absolute peak of a block (0.0 for an empty block)
#[inline]
pub fn peak_abs(block: &[Sample]) -> Sample {
    block.iter().fold(0.0, |peak, &s| peak.max(s.abs()))
}

/// Multiply a block by a linear gain in place
#[inline]
pub fn apply_gain(block: &mut [Sample], gain: f64) {
    for sample in block.iter_mut() {
        *sample *= gain;
    }
}

/// Accumulate `gain * src` into `dst`
#[inline]
pub fn mix_into(dst: &mut [Sample], src: &[Sample], gain: f64) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d += s * gain;
    }
}
