//! Streaming Convolution Engine
//!
//! Uniform partitioned convolution:
//! - Overlap-save with FFT size = 2 × partition
//! - RealFFT for 2x efficiency over complex FFT
//! - Frequency-domain delay line (FDL) of past input spectra
//! - Fixed latency of one partition, pre-queued as silence
//! - Independent impulse per channel (true stereo IR pairs)
//!
//! The processor only sees the [`ConvolutionEngine`] contract: feed a block
//! with `add`, check `available`, read with `get`, consume with `advance`.
//! Output for a block is not assumed to be ready in the same call.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use thiserror::Error;

use crate::Processor;
use irblend_core::{LoadError, Sample};

// ============ Constants ============

/// Minimum partition size
pub const MIN_PARTITION_SIZE: usize = 32;

/// Maximum partition size
pub const MAX_PARTITION_SIZE: usize = 8192;

/// Default partition size (latency in samples)
pub const DEFAULT_PARTITION_SIZE: usize = 128;

/// Channels in an engine-ready impulse buffer
pub const ENGINE_CHANNELS: usize = 2;

// ============ Errors ============

/// Engine rejection of an impulse or configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("impulse has no channels")]
    NoChannels,

    #[error("impulse is empty")]
    EmptyImpulse,

    #[error("impulse channels differ in length ({0} vs {1})")]
    ChannelLengthMismatch(usize, usize),

    #[error("FFT failed: {0}")]
    Fft(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for LoadError {
    fn from(err: EngineError) -> Self {
        LoadError::EngineInit(err.to_string())
    }
}

// ============ Impulse Buffer ============

/// Engine-ready impulse: per-channel samples at the processing rate
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseBuffer {
    channels: Vec<Vec<Sample>>,
    sample_rate: f64,
}

impl ImpulseBuffer {
    pub fn new(channels: Vec<Vec<Sample>>, sample_rate: f64) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Mono impulse duplicated onto both engine channels
    pub fn from_mono(samples: Vec<Sample>, sample_rate: f64) -> Self {
        Self::new(vec![samples.clone(), samples], sample_rate)
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in samples (of the first channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<Sample>] {
        &self.channels
    }

    /// Check the buffer can be handed to an engine
    pub fn validate(&self) -> EngineResult<()> {
        let first = self.channels.first().ok_or(EngineError::NoChannels)?;
        if first.is_empty() {
            return Err(EngineError::EmptyImpulse);
        }
        for channel in &self.channels[1..] {
            if channel.len() != first.len() {
                return Err(EngineError::ChannelLengthMismatch(first.len(), channel.len()));
            }
        }
        Ok(())
    }
}

// ============ Engine Contract ============

/// Streaming convolution engine
///
/// `add` may run on the audio thread and must not allocate; `set_impulse`
/// is control-path only.
pub trait ConvolutionEngine: Send {
    /// Install an impulse, returning the engine's fixed latency in samples
    fn set_impulse(&mut self, impulse: &ImpulseBuffer) -> EngineResult<usize>;

    /// Feed one block; `input[ch]` for each channel fed this call
    fn add(&mut self, input: &[&[Sample]]);

    /// Completed output samples ready to read
    fn available(&self, block_size: usize) -> usize;

    /// Ready output for one channel (at least `available` samples long)
    fn get(&self, channel: usize) -> &[Sample];

    /// Consume `n` ready samples on every channel
    fn advance(&mut self, n: usize);

    /// Back to silence without deallocating
    fn reset(&mut self);

    /// Latency reported by the last successful `set_impulse`
    fn latency(&self) -> usize;

    /// Channels configured by the last successful `set_impulse`
    fn num_channels(&self) -> usize;
}

// ============ Convolution Channel ============

/// Single channel of the partitioned convolver
struct ConvolutionChannel {
    /// IR segment spectra, one per partition (half-spectrum)
    segments: Vec<Vec<Complex<f64>>>,
    /// Past input spectra, ring indexed by `fdl_pos`
    fdl: Vec<Vec<Complex<f64>>>,
    /// Sliding input frame: previous partition | current partition
    frame: Vec<f64>,
    /// Output queue, first `pending` samples valid (shared length)
    output: Vec<f64>,
    /// Fed since the last reset (idle channels are flushed once)
    dirty: bool,
}

impl ConvolutionChannel {
    fn new(
        ir: &[Sample],
        partition: usize,
        output_capacity: usize,
        fft: &Arc<dyn RealToComplex<f64>>,
        scratch: &mut [Complex<f64>],
    ) -> EngineResult<Self> {
        let bins = partition + 1;
        let num_segments = ir.len().div_ceil(partition).max(1);

        let mut segments = Vec::with_capacity(num_segments);
        let mut padded = vec![0.0; partition * 2];
        for chunk in ir.chunks(partition) {
            padded.fill(0.0);
            padded[..chunk.len()].copy_from_slice(chunk);

            let mut spectrum = vec![Complex::new(0.0, 0.0); bins];
            fft.process_with_scratch(&mut padded, &mut spectrum, scratch)
                .map_err(|e| EngineError::Fft(e.to_string()))?;
            segments.push(spectrum);
        }

        Ok(Self {
            fdl: vec![vec![Complex::new(0.0, 0.0); bins]; segments.len()],
            segments,
            frame: vec![0.0; partition * 2],
            output: vec![0.0; output_capacity],
            dirty: false,
        })
    }

    fn clear(&mut self) {
        for spectrum in &mut self.fdl {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.frame.fill(0.0);
        self.output.fill(0.0);
        self.dirty = false;
    }
}

// ============ Partitioned Convolver ============

/// Uniform partitioned overlap-save convolver
///
/// Latency equals the partition size. After every `add` of up to
/// `max_block_size` frames, `available(n) >= n` holds for that block.
pub struct PartitionedConvolver {
    partition: usize,
    max_block_size: usize,
    channels: Vec<ConvolutionChannel>,
    fft_forward: Arc<dyn RealToComplex<f64>>,
    fft_inverse: Arc<dyn ComplexToReal<f64>>,
    /// Samples of the current partition collected so far
    fill: usize,
    /// Ready output samples (same on every channel)
    pending: usize,
    /// Current FDL slot
    fdl_pos: usize,
    // Preallocated work buffers
    time_scratch: Vec<f64>,
    spectrum_scratch: Vec<Complex<f64>>,
    accum: Vec<Complex<f64>>,
    fft_scratch: Vec<Complex<f64>>,
}

impl PartitionedConvolver {
    /// Create an engine; partition size is rounded to a power of two
    pub fn new(partition_size: usize, max_block_size: usize) -> Self {
        let partition = partition_size
            .clamp(MIN_PARTITION_SIZE, MAX_PARTITION_SIZE)
            .next_power_of_two();
        let fft_size = partition * 2;

        let mut planner = RealFftPlanner::<f64>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = fft_forward
            .get_scratch_len()
            .max(fft_inverse.get_scratch_len());

        Self {
            partition,
            max_block_size: max_block_size.max(1),
            channels: Vec::new(),
            fft_forward,
            fft_inverse,
            fill: 0,
            pending: partition,
            fdl_pos: 0,
            time_scratch: vec![0.0; fft_size],
            spectrum_scratch: vec![Complex::new(0.0, 0.0); partition + 1],
            accum: vec![Complex::new(0.0, 0.0); partition + 1],
            fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Partition size in samples
    pub fn partition_size(&self) -> usize {
        self.partition
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// IR partitions per channel
    pub fn num_segments(&self) -> usize {
        self.channels.first().map_or(0, |c| c.segments.len())
    }

    fn output_capacity(&self) -> usize {
        self.max_block_size + 2 * self.partition
    }

    /// Convolve one full partition on every fed channel
    fn process_partition(&mut self, fed: usize) {
        let p = self.partition;
        let num_segments = self.num_segments();
        if num_segments == 0 {
            return;
        }
        let scale = 1.0 / (2 * p) as f64;
        let capacity = self.output_capacity();

        // Queue full: drop the oldest partition (only when nobody advances)
        if self.pending + p > capacity {
            for channel in &mut self.channels {
                channel.output.copy_within(p..self.pending, 0);
            }
            self.pending -= p;
        }
        let out_start = self.pending;

        for (index, channel) in self.channels.iter_mut().enumerate() {
            if index >= fed {
                channel.output[out_start..out_start + p].fill(0.0);
                continue;
            }

            // Forward FFT of [previous | current] frame
            self.time_scratch.copy_from_slice(&channel.frame);
            // Buffer lengths are fixed at construction
            let result = self.fft_forward.process_with_scratch(
                &mut self.time_scratch,
                &mut channel.fdl[self.fdl_pos],
                &mut self.fft_scratch,
            );
            debug_assert!(result.is_ok());

            // Multiply-accumulate across the FDL
            self.accum.fill(Complex::new(0.0, 0.0));
            for (k, segment) in channel.segments.iter().enumerate() {
                let slot = (self.fdl_pos + num_segments - k) % num_segments;
                let input = &channel.fdl[slot];
                for ((acc, &x), &h) in self.accum.iter_mut().zip(input).zip(segment) {
                    *acc += x * h;
                }
            }

            // Inverse FFT, keep the aliasing-free second half
            self.spectrum_scratch.copy_from_slice(&self.accum);
            self.spectrum_scratch[0].im = 0.0;
            self.spectrum_scratch[p].im = 0.0;
            let result = self.fft_inverse.process_with_scratch(
                &mut self.spectrum_scratch,
                &mut self.time_scratch,
                &mut self.fft_scratch,
            );
            debug_assert!(result.is_ok());

            for (out, &y) in channel.output[out_start..out_start + p]
                .iter_mut()
                .zip(&self.time_scratch[p..])
            {
                *out = y * scale;
            }

            // Slide the frame: current partition becomes history
            channel.frame.copy_within(p.., 0);
        }

        self.fdl_pos = (self.fdl_pos + 1) % num_segments;
        self.pending += p;
    }
}

impl ConvolutionEngine for PartitionedConvolver {
    fn set_impulse(&mut self, impulse: &ImpulseBuffer) -> EngineResult<usize> {
        impulse.validate()?;

        let capacity = self.output_capacity();
        let channels = impulse
            .channels()
            .iter()
            .map(|ir| {
                ConvolutionChannel::new(
                    ir,
                    self.partition,
                    capacity,
                    &self.fft_forward,
                    &mut self.fft_scratch,
                )
            })
            .collect::<EngineResult<Vec<_>>>()?;

        self.channels = channels;
        ConvolutionEngine::reset(self);

        log::debug!(
            "PartitionedConvolver: {} ch, {} samples, {} partitions of {}",
            self.channels.len(),
            impulse.len(),
            self.num_segments(),
            self.partition
        );

        Ok(self.partition)
    }

    fn add(&mut self, input: &[&[Sample]]) {
        if self.channels.is_empty() {
            return;
        }
        let fed = input.len().min(self.channels.len());
        let len = input.first().map_or(0, |ch| ch.len());

        // Flush channels that went idle so they restart from silence
        for channel in self.channels.iter_mut().skip(fed) {
            if channel.dirty {
                channel.fdl.iter_mut().for_each(|s| s.fill(Complex::new(0.0, 0.0)));
                channel.frame.fill(0.0);
                channel.dirty = false;
            }
        }

        let p = self.partition;
        let mut offset = 0;
        while offset < len {
            let take = (p - self.fill).min(len - offset);
            for (channel, samples) in self.channels.iter_mut().zip(input).take(fed) {
                let src = &samples[offset..offset + take];
                channel.frame[p + self.fill..p + self.fill + take].copy_from_slice(src);
                channel.dirty = true;
            }
            self.fill += take;
            offset += take;

            if self.fill == p {
                self.process_partition(fed);
                self.fill = 0;
            }
        }
    }

    fn available(&self, _block_size: usize) -> usize {
        if self.channels.is_empty() { 0 } else { self.pending }
    }

    fn get(&self, channel: usize) -> &[Sample] {
        match self.channels.get(channel) {
            Some(ch) => &ch.output[..self.pending],
            None => &[],
        }
    }

    fn advance(&mut self, n: usize) {
        let n = n.min(self.pending);
        if n == 0 {
            return;
        }
        for channel in &mut self.channels {
            channel.output.copy_within(n..self.pending, 0);
        }
        self.pending -= n;
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
        self.fill = 0;
        self.fdl_pos = 0;
        // Pre-queued silence carries the fixed latency
        self.pending = self.partition;
    }

    fn latency(&self) -> usize {
        if self.channels.is_empty() { 0 } else { self.partition }
    }

    fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

impl Processor for PartitionedConvolver {
    fn reset(&mut self) {
        ConvolutionEngine::reset(self);
    }

    fn latency(&self) -> usize {
        ConvolutionEngine::latency(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Run `input` through the engine in blocks, collecting the output stream
    fn run(engine: &mut PartitionedConvolver, input: &[f64], block: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(input.len());
        for chunk in input.chunks(block) {
            engine.add(&[chunk, chunk]);
            assert!(engine.available(chunk.len()) >= chunk.len());
            out.extend_from_slice(&engine.get(0)[..chunk.len()]);
            engine.advance(chunk.len());
        }
        out
    }

    fn direct_convolution(input: &[f64], ir: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; input.len()];
        for (n, y) in out.iter_mut().enumerate() {
            for (k, &h) in ir.iter().enumerate().take(n + 1) {
                *y += h * input[n - k];
            }
        }
        out
    }

    #[test]
    fn test_rejects_invalid_impulse() {
        let mut engine = PartitionedConvolver::new(64, 512);
        assert_eq!(
            engine.set_impulse(&ImpulseBuffer::new(vec![], 48000.0)),
            Err(EngineError::NoChannels)
        );
        assert_eq!(
            engine.set_impulse(&ImpulseBuffer::from_mono(vec![], 48000.0)),
            Err(EngineError::EmptyImpulse)
        );
        assert!(matches!(
            engine.set_impulse(&ImpulseBuffer::new(vec![vec![1.0; 4], vec![1.0; 3]], 48000.0)),
            Err(EngineError::ChannelLengthMismatch(4, 3))
        ));
        assert_eq!(ConvolutionEngine::latency(&engine), 0);
    }

    #[test]
    fn test_partition_rounding() {
        assert_eq!(PartitionedConvolver::new(100, 512).partition_size(), 128);
        assert_eq!(PartitionedConvolver::new(1, 512).partition_size(), MIN_PARTITION_SIZE);
        assert_eq!(PartitionedConvolver::new(1 << 20, 512).partition_size(), MAX_PARTITION_SIZE);
    }

    #[test]
    fn test_unit_impulse_is_pure_delay() {
        let mut engine = PartitionedConvolver::new(64, 256);
        let mut ir = vec![0.0; 200];
        ir[0] = 1.0;
        let latency = engine.set_impulse(&ImpulseBuffer::from_mono(ir, 48000.0)).unwrap();
        assert_eq!(latency, 64);

        let input: Vec<f64> = (0..1000).map(|i| ((i * 7) % 13) as f64 / 13.0 - 0.5).collect();
        let out = run(&mut engine, &input, 100);

        for i in 0..latency {
            assert_relative_eq!(out[i], 0.0, epsilon = 1e-12);
        }
        for i in latency..input.len() {
            assert_relative_eq!(out[i], input[i - latency], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_matches_direct_convolution() {
        let mut engine = PartitionedConvolver::new(32, 64);
        let ir: Vec<f64> = (0..150)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -0.5 };
                (-(i as f64) / 30.0).exp() * sign
            })
            .collect();
        engine.set_impulse(&ImpulseBuffer::from_mono(ir.clone(), 48000.0)).unwrap();

        let input: Vec<f64> = (0..700).map(|i| (i as f64 * 0.13).sin()).collect();
        // Odd block size exercises partial partitions
        let out = run(&mut engine, &input, 37);
        let expected = direct_convolution(&input, &ir);

        for i in 32..input.len() {
            assert_relative_eq!(out[i], expected[i - 32], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_stereo_channels_are_independent() {
        let mut engine = PartitionedConvolver::new(32, 64);
        let left = vec![1.0, 0.0, 0.0, 0.0];
        let right = vec![0.0, 0.5, 0.0, 0.0];
        engine.set_impulse(&ImpulseBuffer::new(vec![left, right], 48000.0)).unwrap();

        let mut impulse = vec![0.0; 64];
        impulse[0] = 1.0;
        engine.add(&[&impulse[..], &impulse[..]]);
        assert!(engine.available(64) >= 64);

        let l = engine.get(0);
        let r = engine.get(1);
        assert_relative_eq!(l[32], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[32], 0.0, epsilon = 1e-12);
        assert_relative_eq!(r[33], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut engine = PartitionedConvolver::new(32, 128);
        engine.set_impulse(&ImpulseBuffer::from_mono(vec![0.5; 300], 48000.0)).unwrap();

        let loud = vec![1.0; 128];
        run(&mut engine, &loud, 128);
        ConvolutionEngine::reset(&mut engine);

        let silent = vec![0.0; 512];
        let out = run(&mut engine, &silent, 128);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_idle_channel_outputs_silence() {
        let mut engine = PartitionedConvolver::new(32, 64);
        engine.set_impulse(&ImpulseBuffer::from_mono(vec![1.0], 48000.0)).unwrap();

        let block = vec![1.0; 64];
        engine.add(&[&block[..]]);
        assert!(engine.get(1).iter().all(|&s| s == 0.0));
        assert_eq!(engine.get(0).len(), engine.available(64));
    }
}
