// FeatureExtractor - frame-based feature extraction for lyric alignment
//
// Splits a mono signal into fixed, non-overlapping windows and describes each
// one with four values the onset model and aligner work from.
//
// Module organization:
// - types: Data structures (FeatureVector, FeatureFrame)
// - spectral: Frequency-domain features (normalized centroid)
// - temporal: Time-domain features (RMS, ZCR, peak)
// - mod.rs: Coordinator (FeatureExtractor)
//
// Features extracted:
// 1. RMS: overall loudness of the window
// 2. Zero-Crossing Rate: noisiness / brightness in the time domain
// 3. Spectral Centroid: brightness, normalized to [0, 1)
// 4. Peak Absolute Amplitude
//
// Window i is stamped at i * window_ms / 1000 seconds. A trailing partial
// window is still emitted when non-empty.

mod spectral;
mod temporal;
mod types;

pub use types::{FeatureFrame, FeatureVector, FEATURE_DIMENSIONS};

use std::path::Path;

use spectral::SpectralFeatures;

use crate::audio::{downmix_interleaved, AudioSource, ReadOutcome, WavSource};
use crate::cancel::CancelToken;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// FeatureExtractor coordinates per-window feature extraction
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    window_ms: u32,
    min_fft_size: usize,
}

impl FeatureExtractor {
    /// # Arguments
    /// * `window_ms` - Window length in milliseconds (at least 1)
    /// * `min_fft_size` - Smallest FFT length used for the centroid
    pub fn new(window_ms: u32, min_fft_size: usize) -> Self {
        Self {
            window_ms: window_ms.max(1),
            min_fft_size,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.window_ms, config.min_fft_size)
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }

    /// Samples per window at `sample_rate`: round(sr * ms / 1000), at least 1
    pub fn window_samples(&self, sample_rate: u32) -> usize {
        let samples = (sample_rate as f64 * self.window_ms as f64 / 1000.0).round() as usize;
        samples.max(1)
    }

    /// Extract features from a mono signal held in memory
    ///
    /// # Arguments
    /// * `samples` - Mono samples in [-1, 1]
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// One frame per window in timestamp order; empty for empty input.
    pub fn extract(&self, samples: &[f64], sample_rate: u32) -> Vec<FeatureFrame> {
        let mut spectral = SpectralFeatures::new(self.min_fft_size);
        samples
            .chunks(self.window_samples(sample_rate))
            .enumerate()
            .map(|(idx, window)| self.frame(idx, window, &mut spectral))
            .collect()
    }

    /// Stream a source to the end, extracting features window by window
    ///
    /// The source is read from its current position until it reports end of
    /// stream or an empty read. Cancellation is checked once per window.
    ///
    /// # Errors
    /// `SourceFailed` when a read fails, `Cancelled` when `cancel` fires.
    pub fn extract_from_source(
        &self,
        source: &mut dyn AudioSource,
        cancel: &CancelToken,
    ) -> Result<Vec<FeatureFrame>, AnalysisError> {
        let info = source.info();
        let channels = info.channels.max(1) as usize;
        let window_len = self.window_samples(info.sample_rate);

        let mut read_buffer = vec![0.0f32; window_len * channels];
        let mut mono = Vec::with_capacity(window_len);
        let mut window = Vec::with_capacity(window_len);
        let mut spectral = SpectralFeatures::new(self.min_fft_size);
        let mut frames = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            let wanted = (window_len - window.len()) * channels;
            match source.read_frames(&mut read_buffer[..wanted])? {
                ReadOutcome::Frames(0) | ReadOutcome::EndOfStream => break,
                ReadOutcome::Frames(n) => {
                    downmix_interleaved(&read_buffer[..n * channels], channels, &mut mono);
                    window.extend_from_slice(&mono);
                    if window.len() >= window_len {
                        frames.push(self.frame(frames.len(), &window, &mut spectral));
                        window.clear();
                    }
                }
            }
        }

        if !window.is_empty() {
            frames.push(self.frame(frames.len(), &window, &mut spectral));
        }

        log::debug!(
            "[FeatureExtractor] {} frames from {:.2}s of audio",
            frames.len(),
            info.total_duration_secs
        );
        Ok(frames)
    }

    /// Extract features from a WAV file
    ///
    /// Any failure to open or decode yields an empty sequence, which callers
    /// treat as "analysis unavailable".
    pub fn extract_from_path<P: AsRef<Path>>(&self, path: P) -> Vec<FeatureFrame> {
        let path = path.as_ref();
        let mut source = match WavSource::open(path) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("[FeatureExtractor] Cannot open {:?}: {}", path, err);
                return Vec::new();
            }
        };

        match self.extract_from_source(&mut source, &CancelToken::new()) {
            Ok(frames) => frames,
            Err(err) => {
                log::warn!("[FeatureExtractor] Decoding {:?} failed: {}", path, err);
                Vec::new()
            }
        }
    }

    fn frame(&self, idx: usize, window: &[f64], spectral: &mut SpectralFeatures) -> FeatureFrame {
        FeatureFrame {
            timestamp_secs: idx as f64 * self.window_ms as f64 / 1000.0,
            features: FeatureVector {
                rms: temporal::rms(window),
                zero_crossing_rate: temporal::zero_crossing_rate(window),
                spectral_centroid: spectral.compute_centroid(window),
                peak_abs: temporal::peak_abs(window),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemorySource;
    use crate::error::TransportError;
    use crate::audio::StreamInfo;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn white_noise(len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_window_samples_rounding() {
        let extractor = FeatureExtractor::new(50, 64);
        assert_eq!(extractor.window_samples(44100), 2205);
        assert_eq!(extractor.window_samples(22050), 1103);
        assert_eq!(FeatureExtractor::new(1, 64).window_samples(100), 1);
    }

    #[test]
    fn test_silence_features_are_zero() {
        let extractor = FeatureExtractor::new(50, 64);
        let frames = extractor.extract(&vec![0.0; 8000], 8000);

        assert_eq!(frames.len(), 20);
        for frame in &frames {
            assert_eq!(frame.features, FeatureVector::default());
        }
    }

    #[test]
    fn test_white_noise_has_high_zcr() {
        let extractor = FeatureExtractor::new(50, 64);
        let frames = extractor.extract(&white_noise(44100, 11), 44100);

        for frame in &frames {
            assert!(
                frame.features.zero_crossing_rate > 0.35,
                "noise ZCR {} too low",
                frame.features.zero_crossing_rate
            );
            assert!(frame.features.spectral_centroid > 0.3);
        }
    }

    #[test]
    fn test_timestamps_and_partial_window() {
        let extractor = FeatureExtractor::new(50, 64);
        // 1000 samples at 8 kHz: 400-sample windows -> 400, 400, 200
        let frames = extractor.extract(&vec![0.25; 1000], 8000);

        let stamps: Vec<f64> = frames.iter().map(|f| f.timestamp_secs).collect();
        assert_eq!(stamps, vec![0.0, 0.05, 0.1]);
        assert!((frames[2].features.rms - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_source_matches_in_memory_extraction() {
        let extractor = FeatureExtractor::new(50, 64);
        let mono = white_noise(9000, 5);

        // Same signal duplicated into two channels
        let interleaved: Vec<f32> = mono.iter().flat_map(|&s| [s as f32, s as f32]).collect();
        let mut source = MemorySource::new(interleaved, 8000, 2);
        let streamed = extractor
            .extract_from_source(&mut source, &CancelToken::new())
            .unwrap();

        let quantized: Vec<f64> = mono.iter().map(|&s| s as f32 as f64).collect();
        let direct = extractor.extract(&quantized, 8000);

        assert_eq!(streamed.len(), direct.len());
        for (a, b) in streamed.iter().zip(direct.iter()) {
            assert_eq!(a.timestamp_secs, b.timestamp_secs);
            assert!((a.features.rms - b.features.rms).abs() < 1e-9);
            assert!((a.features.spectral_centroid - b.features.spectral_centroid).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cancelled_extraction() {
        let extractor = FeatureExtractor::new(50, 64);
        let mut source = MemorySource::mono(vec![0.0; 8000], 8000);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(
            extractor.extract_from_source(&mut source, &cancel),
            Err(AnalysisError::Cancelled)
        );
    }

    struct FailingSource;

    impl AudioSource for FailingSource {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                sample_rate: 8000,
                channels: 1,
                total_duration_secs: 1.0,
            }
        }

        fn read_frames(&mut self, _buffer: &mut [f32]) -> Result<ReadOutcome, TransportError> {
            Err(TransportError::DecodeFailed {
                reason: "corrupt frame".to_string(),
            })
        }

        fn seek(&mut self, _seconds: f64) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Delivers one full window, then only empty reads
    struct StallingSource {
        delivered: bool,
        reads: usize,
    }

    impl AudioSource for StallingSource {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                sample_rate: 8000,
                channels: 1,
                total_duration_secs: 1.0,
            }
        }

        fn read_frames(&mut self, buffer: &mut [f32]) -> Result<ReadOutcome, TransportError> {
            self.reads += 1;
            if self.delivered {
                return Ok(ReadOutcome::Frames(0));
            }
            self.delivered = true;
            buffer.fill(0.5);
            Ok(ReadOutcome::Frames(buffer.len()))
        }

        fn seek(&mut self, _seconds: f64) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_read_ends_extraction() {
        let extractor = FeatureExtractor::new(50, 64);
        let mut source = StallingSource {
            delivered: false,
            reads: 0,
        };
        let frames = extractor
            .extract_from_source(&mut source, &CancelToken::new())
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert!((frames[0].features.rms - 0.5).abs() < 1e-6);
        assert_eq!(source.reads, 2);
    }

    #[test]
    fn test_decode_failure_surfaces_from_source() {
        let extractor = FeatureExtractor::new(50, 64);
        let result = extractor.extract_from_source(&mut FailingSource, &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::SourceFailed { .. })));
    }

    #[test]
    fn test_missing_file_gives_empty_sequence() {
        let extractor = FeatureExtractor::new(50, 64);
        assert!(extractor.extract_from_path("/no/such/song.wav").is_empty());
    }
}
