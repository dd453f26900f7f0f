// Transport seam - the contract between a decoder and the analysis core
//
// The core only ever reads from a source: open (done by the concrete type),
// read interleaved frames, seek. Decoding, playback and device handling stay
// outside the crate.

use crate::error::TransportError;

/// Basic properties of an opened stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_duration_secs: f64,
}

/// Result of a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Number of interleaved frames written to the front of the buffer
    Frames(usize),
    EndOfStream,
}

/// A readable, seekable PCM stream
pub trait AudioSource: Send {
    fn info(&self) -> StreamInfo;

    /// Fill `buffer` with interleaved samples in [-1, 1]
    ///
    /// The buffer length should be a multiple of the channel count; any
    /// trailing partial frame is left untouched.
    /// Readers treat `Frames(0)` the same as `EndOfStream`.
    fn read_frames(&mut self, buffer: &mut [f32]) -> Result<ReadOutcome, TransportError>;

    fn seek(&mut self, seconds: f64) -> Result<(), TransportError>;
}

/// Average interleaved channels into `mono`, returning the frame count
///
/// `mono` is cleared first and grows as needed.
pub fn downmix_interleaved(interleaved: &[f32], channels: usize, mono: &mut Vec<f64>) -> usize {
    mono.clear();
    let channels = channels.max(1);
    for frame in interleaved.chunks_exact(channels) {
        let sum: f64 = frame.iter().map(|&s| s as f64).sum();
        mono.push(sum / channels as f64);
    }
    mono.len()
}

/// Convert signed 16-bit PCM to float samples in [-1, 1)
pub fn i16_to_f32(input: &[i16], output: &mut [f32]) -> usize {
    let n = input.len().min(output.len());
    for (dst, &src) in output.iter_mut().zip(input.iter()).take(n) {
        *dst = src as f32 / 32768.0;
    }
    n
}

/// Interleaved PCM held in memory
///
/// Used by tests and by callers that already decoded a track elsewhere.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    /// Read position in frames
    position: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
            position: 0,
        }
    }

    /// Convenience constructor for a mono signal
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    fn total_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

impl AudioSource for MemorySource {
    fn info(&self) -> StreamInfo {
        let duration = if self.sample_rate > 0 {
            self.total_frames() as f64 / self.sample_rate as f64
        } else {
            0.0
        };
        StreamInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            total_duration_secs: duration,
        }
    }

    fn read_frames(&mut self, buffer: &mut [f32]) -> Result<ReadOutcome, TransportError> {
        let channels = self.channels as usize;
        let remaining = self.total_frames().saturating_sub(self.position);
        if remaining == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }

        let frames = (buffer.len() / channels).min(remaining);
        let start = self.position * channels;
        let end = start + frames * channels;
        buffer[..frames * channels].copy_from_slice(&self.samples[start..end]);
        self.position += frames;

        Ok(ReadOutcome::Frames(frames))
    }

    fn seek(&mut self, seconds: f64) -> Result<(), TransportError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(TransportError::SeekFailed {
                seconds,
                reason: "position must be a non-negative number".to_string(),
            });
        }
        let frame = (seconds * self.sample_rate as f64).round() as usize;
        self.position = frame.min(self.total_frames());
        Ok(())
    }
}
