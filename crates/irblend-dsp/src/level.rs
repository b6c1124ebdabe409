//! Input level detection for dynamic blending
//!
//! Peak detection is stateless. RMS detection keeps a trailing window of
//! squared samples per channel, sized in milliseconds and rebuilt whenever
//! the sample rate changes.

use irblend_core::{Decibels, DetectionMode, Sample, peak_abs};

use crate::{Processor, ProcessorConfig};

/// Default RMS window length
pub const DEFAULT_RMS_WINDOW_MS: f64 = 10.0;

/// Sample rate used when an invalid rate is supplied
const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

// ============ RMS Window ============

/// Trailing window of squared samples with a running sum
#[derive(Debug, Clone)]
struct RmsWindow {
    buffer: Vec<f64>,
    write_pos: usize,
    sum_squares: f64,
}

impl RmsWindow {
    fn new(window_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; window_samples.max(1)],
            write_pos: 0,
            sum_squares: 0.0,
        }
    }

    fn push_block(&mut self, block: &[Sample]) {
        let len = self.buffer.len();
        for &sample in block {
            let squared = sample * sample;
            self.sum_squares += squared - self.buffer[self.write_pos];
            self.buffer[self.write_pos] = squared;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    fn rms(&self) -> f64 {
        // Running sum can drift a hair below zero after long silence
        (self.sum_squares.max(0.0) / self.buffer.len() as f64).sqrt()
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.sum_squares = 0.0;
    }
}

// ============ Level Detector ============

/// Block level detector (peak or trailing RMS), reporting dB
#[derive(Debug, Clone)]
pub struct LevelDetector {
    windows: [RmsWindow; 2],
    window_ms: f64,
    sample_rate: f64,
}

impl LevelDetector {
    pub fn new(sample_rate: f64, window_ms: f64) -> Self {
        let sample_rate = sanitize_rate(sample_rate);
        let window_ms = if window_ms.is_finite() && window_ms > 0.0 {
            window_ms
        } else {
            DEFAULT_RMS_WINDOW_MS
        };
        let samples = window_samples(sample_rate, window_ms);
        Self {
            windows: [RmsWindow::new(samples), RmsWindow::new(samples)],
            window_ms,
            sample_rate,
        }
    }

    /// RMS window length in samples
    pub fn window_len(&self) -> usize {
        self.windows[0].buffer.len()
    }

    /// Peak level of a block in dB, floored for silent or empty blocks
    pub fn detect_peak(&self, block: &[Sample]) -> f64 {
        Decibels::from_level(peak_abs(block)).0
    }

    /// Push a block into the trailing window and return its RMS level in dB
    pub fn detect_rms(&mut self, block: &[Sample]) -> f64 {
        self.detect_rms_channel(0, block)
    }

    fn detect_rms_channel(&mut self, channel: usize, block: &[Sample]) -> f64 {
        let window = &mut self.windows[channel];
        window.push_block(block);
        Decibels::from_level(window.rms()).0
    }

    /// Level of a mono block in the given mode
    pub fn detect(&mut self, mode: DetectionMode, block: &[Sample]) -> f64 {
        match mode {
            DetectionMode::Peak => self.detect_peak(block),
            DetectionMode::Rms => self.detect_rms(block),
        }
    }

    /// Louder of the two channel levels
    pub fn detect_stereo(&mut self, mode: DetectionMode, left: &[Sample], right: &[Sample]) -> f64 {
        match mode {
            DetectionMode::Peak => self.detect_peak(left).max(self.detect_peak(right)),
            DetectionMode::Rms => {
                let l = self.detect_rms_channel(0, left);
                let r = self.detect_rms_channel(1, right);
                l.max(r)
            }
        }
    }
}

impl Processor for LevelDetector {
    fn reset(&mut self) {
        for window in &mut self.windows {
            window.reset();
        }
    }
}

impl ProcessorConfig for LevelDetector {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sanitize_rate(sample_rate);
        let samples = window_samples(self.sample_rate, self.window_ms);
        self.windows = [RmsWindow::new(samples), RmsWindow::new(samples)];
    }
}

fn sanitize_rate(sample_rate: f64) -> f64 {
    if sample_rate > 0.0 && sample_rate.is_finite() {
        sample_rate
    } else {
        DEFAULT_SAMPLE_RATE
    }
}

fn window_samples(sample_rate: f64, window_ms: f64) -> usize {
    ((window_ms * sample_rate / 1000.0).round() as usize).max(1)
}
