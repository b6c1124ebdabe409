//! Latency Alignment Delay Line
//!
//! Block-oriented circular buffer used to hold back the faster of two
//! signal paths so both can be summed in phase:
//! - One `write` per processed block advances the cursor
//! - `read_delayed` fetches the block ending `delay` samples before the cursor
//! - Resizing happens on the control path only and flushes the buffer

use irblend_core::Sample;

use crate::Processor;

// ============ Delay Line ============

/// Circular buffer delay line for latency compensation
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
}

impl DelayLine {
    /// Create new delay line holding `len` samples
    pub fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            write_pos: 0,
        }
    }

    /// Ring length in samples
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Resize and flush (NOT in audio thread!)
    pub fn resize(&mut self, len: usize) {
        let len = len.max(1);
        if len != self.buffer.len() {
            self.buffer = vec![0.0; len];
        } else {
            self.buffer.fill(0.0);
        }
        self.write_pos = 0;
    }

    /// Write a block at the cursor and advance it
    pub fn write(&mut self, block: &[Sample]) {
        let len = self.buffer.len();

        // Only the newest `len` samples survive a block longer than the ring
        let skip = block.len().saturating_sub(len);
        self.write_pos = (self.write_pos + skip) % len;
        let block = &block[skip..];

        let first = block.len().min(len - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&block[..first]);
        let rest = block.len() - first;
        self.buffer[..rest].copy_from_slice(&block[first..]);

        self.write_pos = (self.write_pos + block.len()) % len;
    }

    /// Read the `out.len()` samples ending `delay` samples before the cursor
    ///
    /// The delay is clamped so the read window never leaves the ring.
    pub fn read_delayed(&self, out: &mut [Sample], delay: usize) {
        let len = self.buffer.len();
        let n = out.len().min(len);
        let excess = out.len() - n;
        out[..excess].fill(0.0);
        let out = &mut out[excess..];

        let delay = delay.min(len - n);
        let start = (self.write_pos + len - (n + delay) % len) % len;

        let first = n.min(len - start);
        out[..first].copy_from_slice(&self.buffer[start..start + first]);
        out[first..].copy_from_slice(&self.buffer[..n - first]);
    }

    /// Write a block, then overwrite it with its delayed counterpart
    pub fn process_block(&mut self, block: &mut [Sample], delay: usize) {
        self.write(block);
        self.read_delayed(block, delay);
    }

    /// Clear buffer (reset to zeros)
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

impl Processor for DelayLine {
    fn reset(&mut self) {
        self.clear();
    }
}
