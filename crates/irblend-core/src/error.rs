//! Error types for IrBlend

use thiserror::Error;

/// Impulse response load error
///
/// Load errors never cross into the audio path; a failed load leaves the
/// slot it targeted untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Failed to open or read audio file: {0}")]
    Decode(String),

    #[error("No impulse response loaded")]
    EmptyBuffer,

    #[error("Failed to resample IR to target sample rate: {0}")]
    Resample(String),

    #[error("Cannot allocate engine buffer of {0} samples")]
    EngineAllocation(usize),

    #[error("IR buffer is invalid: {0}")]
    InvalidImpulse(String),

    #[error("Failed to initialize convolution engine with IR: {0}")]
    EngineInit(String),
}

/// Result type alias
pub type LoadResult<T> = Result<T, LoadError>;
