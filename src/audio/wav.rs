// WAV source - hound-backed implementation of the transport seam

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use super::source::{AudioSource, ReadOutcome, StreamInfo};
use crate::error::TransportError;

/// Streaming reader over a PCM or float WAV file
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    info: StreamInfo,
    format: SampleFormat,
    bits_per_sample: u16,
}

impl WavSource {
    /// Open a WAV file for streaming reads
    ///
    /// # Errors
    /// `OpenFailed` when the file is missing or the header is invalid,
    /// `UnsupportedFormat` for integer depths above 32 bits.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let reader = WavReader::open(path).map_err(|err| TransportError::OpenFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

        let spec = reader.spec();
        if spec.sample_format == SampleFormat::Int && spec.bits_per_sample > 32 {
            return Err(TransportError::UnsupportedFormat {
                details: format!("{}-bit integer PCM", spec.bits_per_sample),
            });
        }

        let total_frames = reader.duration();
        let info = StreamInfo {
            sample_rate: spec.sample_rate,
            channels: spec.channels.max(1),
            total_duration_secs: if spec.sample_rate > 0 {
                total_frames as f64 / spec.sample_rate as f64
            } else {
                0.0
            },
        };

        log::debug!(
            "[WavSource] Opened {:?}: {} Hz, {} ch, {:.2}s",
            path,
            info.sample_rate,
            info.channels,
            info.total_duration_secs
        );

        Ok(Self {
            reader,
            info,
            format: spec.sample_format,
            bits_per_sample: spec.bits_per_sample,
        })
    }
}

impl AudioSource for WavSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_frames(&mut self, buffer: &mut [f32]) -> Result<ReadOutcome, TransportError> {
        let channels = self.info.channels as usize;
        let wanted = (buffer.len() / channels) * channels;
        let mut written = 0;

        match self.format {
            SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    buffer[written] = sample?;
                    written += 1;
                }
            }
            SampleFormat::Int => {
                let scale = (1u64 << (self.bits_per_sample.max(1) - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    buffer[written] = sample? as f32 / scale;
                    written += 1;
                }
            }
        }

        let frames = written / channels;
        if frames == 0 {
            Ok(ReadOutcome::EndOfStream)
        } else {
            Ok(ReadOutcome::Frames(frames))
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<(), TransportError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(TransportError::SeekFailed {
                seconds,
                reason: "position must be a non-negative number".to_string(),
            });
        }
        let frame = (seconds * self.info.sample_rate as f64).round() as u32;
        self.reader
            .seek(frame)
            .map_err(|err| TransportError::SeekFailed {
                seconds,
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lyric_sync_{}_{}.wav", name, std::process::id()))
    }

    #[test]
    fn test_reads_16bit_stereo() {
        let path = temp_wav("stereo16");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavSource::open(&path).unwrap();
        let info = source.info();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 2);
        assert!((info.total_duration_secs - 100.0 / 8000.0).abs() < 1e-9);

        let mut buffer = [0.0f32; 64];
        assert_eq!(source.read_frames(&mut buffer).unwrap(), ReadOutcome::Frames(32));
        assert!((buffer[0] - 0.5).abs() < 1e-6);
        assert!((buffer[1] + 0.5).abs() < 1e-6);

        source.seek(0.0).unwrap();
        let mut total = 0;
        while let ReadOutcome::Frames(n) = source.read_frames(&mut buffer).unwrap() {
            total += n;
        }
        assert_eq!(total, 100);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let err = WavSource::open("/no/such/track.wav").err().unwrap();
        assert!(matches!(err, TransportError::OpenFailed { .. }));
    }
}
