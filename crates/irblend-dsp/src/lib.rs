//! irblend-dsp: DSP building blocks for IrBlend
//!
//! ## Modules
//! - `convolution` - Convolution engine contract and uniform partitioned FFT convolver
//! - `delay` - Ring-buffer delay line for latency alignment
//! - `level` - Peak / trailing-RMS level detection
//! - `envelope` - Attack/release smoother for the blend control
//! - `blend` - Soft-knee blend curve and crossfade gain laws

pub mod convolution;
pub mod delay;
pub mod level;
pub mod envelope;
pub mod blend;

pub use blend::{BlendCurve, BlendGains};
pub use convolution::{ConvolutionEngine, EngineError, EngineResult, ImpulseBuffer, PartitionedConvolver};
pub use delay::DelayLine;
pub use envelope::EnvelopeSmoother;
pub use level::LevelDetector;

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
