//! irblend-engine: Dual-IR convolution blending
//!
//! Provides:
//! - `DualPathProcessor`: two convolution paths crossfaded by a static or
//!   level-driven blend, with latency alignment and output gain
//! - `ConvolutionPath`: one IR slot (loader + engine + load state)
//! - `BackgroundLoader`: IR preparation on a worker thread
//! - `EngineConfig` / `BlendSettings`: configuration and parameter snapshots

// Too many arguments is common in audio processing functions
#![allow(clippy::too_many_arguments)]

mod config;
mod loader;
mod path;
mod processor;

pub use config::{BlendSettings, EngineConfig, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use loader::{BackgroundLoader, LoadRequest, LoadResponse, LoaderError};
pub use path::{ConvolutionPath, PreparedPath};
pub use processor::DualPathProcessor;

pub use irblend_core::{DetectionMode, IrSlot, LoadError, LoadResult};
pub use irblend_dsp::{ConvolutionEngine, PartitionedConvolver, Processor, ProcessorConfig};
