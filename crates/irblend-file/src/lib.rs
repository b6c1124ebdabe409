//! irblend-file: Impulse response file loading
//!
//! Provides:
//! - WAV decoding (via hound) - native, 8/16/24/32-bit int and 32-bit float
//! - FLAC / AIFF decoding (via symphonia)
//! - Windowed-sinc resampling (via rubato)
//! - `ImpulseLoader`: decode, calibrate, and prepare engine-ready impulses

mod audio_file;
mod error;
mod loader;
mod resample;

pub use audio_file::*;
pub use error::*;
pub use loader::*;
pub use resample::*;
