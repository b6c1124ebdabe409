//! Audio file decoding
//!
//! Supports:
//! - WAV (8/16/24/32-bit int, 32-bit float) via hound
//! - FLAC, AIFF and anything else symphonia can probe

use std::fs::File;
use std::path::Path;

use irblend_core::Sample;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{FileError, FileResult};

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Audio file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Flac,
    Aiff,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "wav" | "wave" => Self::Wav,
            "flac" => Self::Flac,
            "aif" | "aiff" => Self::Aiff,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO DATA CONTAINER
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoded audio at its native rate
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (deinterleaved, one Vec per channel)
    pub channels: Vec<Vec<Sample>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Original format
    pub format: AudioFormat,
}

impl AudioData {
    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames
    pub fn num_frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Create from interleaved samples
    pub fn from_interleaved(samples: &[Sample], num_channels: usize, sample_rate: u32) -> Self {
        let num_channels = num_channels.max(1);
        let num_frames = samples.len() / num_channels;
        let mut channels = vec![vec![0.0; num_frames]; num_channels];

        for (i, chunk) in samples.chunks_exact(num_channels).enumerate() {
            for (ch, &sample) in chunk.iter().enumerate() {
                channels[ch][i] = sample;
            }
        }

        Self {
            channels,
            sample_rate,
            format: AudioFormat::Unknown,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV READING (hound)
// ═══════════════════════════════════════════════════════════════════════════════

/// Read WAV file using hound
pub fn read_wav<P: AsRef<Path>>(path: P) -> FileResult<AudioData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(FileError::NotFound(path.display().to_string()));
    }

    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        return Err(FileError::InvalidFile("WAV declares zero channels".to_string()));
    }

    let samples: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_value))
                .collect::<Result<_, _>>()?
        }
    };

    let mut data = AudioData::from_interleaved(&samples, num_channels, spec.sample_rate);
    data.format = AudioFormat::Wav;
    Ok(data)
}

// ═══════════════════════════════════════════════════════════════════════════════
// GENERIC READING (symphonia)
// ═══════════════════════════════════════════════════════════════════════════════

/// Read any supported audio file
pub fn read_audio<P: AsRef<Path>>(path: P) -> FileResult<AudioData> {
    let path = path.as_ref();
    let format = AudioFormat::from_path(path);

    // For WAV, use hound (faster); fall through to symphonia for
    // WAV flavours hound rejects (e.g. 64-bit float)
    if format == AudioFormat::Wav {
        match read_wav(path) {
            Ok(data) => return Ok(data),
            Err(FileError::NotFound(p)) => return Err(FileError::NotFound(p)),
            Err(e) => log::debug!("hound rejected {}: {}, trying symphonia", path.display(), e),
        }
    }

    let file = File::open(path).map_err(|_| FileError::NotFound(path.display().to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| FileError::UnsupportedFormat(e.to_string()))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FileError::InvalidFile("No audio track found".to_string()))?;

    let track_id = track.id;
    let num_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| FileError::InvalidFile("Missing sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FileError::DecodeError(e.to_string()))?;

    let mut all_samples: Vec<Vec<Sample>> = vec![Vec::new(); num_channels];

    loop {
        match format_reader.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }

                match decoder.decode(&packet) {
                    Ok(decoded) => copy_audio_buffer(&decoded, &mut all_samples),
                    Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                    Err(e) => return Err(FileError::DecodeError(e.to_string())),
                }
            }
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(FileError::DecodeError(e.to_string())),
        }
    }

    Ok(AudioData {
        channels: all_samples,
        sample_rate,
        format,
    })
}

/// Append each channel of a decoded buffer, scaled to [-1, 1]
macro_rules! extend_channels {
    ($buf:expr, $output:expr, $convert:expr) => {
        for (ch, out_ch) in $output.iter_mut().enumerate() {
            if ch < $buf.spec().channels.count() {
                out_ch.extend($buf.chan(ch).iter().map($convert));
            }
        }
    };
}

/// Copy samples from symphonia buffer to our format
fn copy_audio_buffer(buffer: &AudioBufferRef, output: &mut [Vec<Sample>]) {
    match buffer {
        AudioBufferRef::F32(buf) => extend_channels!(buf, output, |&s| s as f64),
        AudioBufferRef::F64(buf) => extend_channels!(buf, output, |&s| s),
        AudioBufferRef::S8(buf) => extend_channels!(buf, output, |&s| s as f64 / 128.0),
        AudioBufferRef::S16(buf) => extend_channels!(buf, output, |&s| s as f64 / 32768.0),
        AudioBufferRef::S24(buf) => extend_channels!(buf, output, |s| s.0 as f64 / 8388608.0),
        AudioBufferRef::S32(buf) => extend_channels!(buf, output, |&s| s as f64 / 2147483648.0),
        AudioBufferRef::U8(buf) => extend_channels!(buf, output, |&s| (s as f64 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => {
            extend_channels!(buf, output, |&s| (s as f64 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(buf) => {
            extend_channels!(buf, output, |s| (s.0 as f64 - 8388608.0) / 8388608.0)
        }
        AudioBufferRef::U32(buf) => {
            extend_channels!(buf, output, |&s| (s as f64 - 2147483648.0) / 2147483648.0)
        }
    }
}
