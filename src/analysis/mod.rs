// Analysis module - offline DSP pipeline for one track
//
// Pipeline: AudioSource -> FeatureExtractor -> (optional) OnsetModel
//
// Everything here is CPU-bound batch work. It runs synchronously on whatever
// thread calls it (an alignment worker, a blocking task in the resync loop)
// and never touches the capture path.

pub mod features;
pub mod fft;
pub mod onset;

use std::path::Path;

use features::{FeatureExtractor, FeatureFrame};
use onset::OnsetModel;

use crate::audio::{AudioSource, WavSource};
use crate::cancel::CancelToken;
use crate::config::AnalysisConfig;
use crate::error::{log_transport_error, AnalysisError};

/// Feature sequence of a track plus onset scores when a model is available
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackAnalysis {
    pub frames: Vec<FeatureFrame>,
    /// One smoothed probability per frame; `None` without a trained model
    pub probabilities: Option<Vec<f64>>,
    pub window_ms: u32,
    pub duration_secs: f64,
}

impl TrackAnalysis {
    /// Wrap an already extracted frame sequence
    pub fn from_frames(
        frames: Vec<FeatureFrame>,
        window_ms: u32,
        model: Option<&OnsetModel>,
    ) -> Self {
        let probabilities = model.map(|m| m.predict(&frames));
        let duration_secs = frames.len() as f64 * window_ms as f64 / 1000.0;
        Self {
            frames,
            probabilities,
            window_ms,
            duration_secs,
        }
    }

    /// Analysis of an unavailable track: no frames, no scores
    pub fn unavailable(window_ms: u32) -> Self {
        Self {
            window_ms,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Per-frame RMS energy
    pub fn energy(&self) -> Vec<f64> {
        self.frames.iter().map(FeatureFrame::rms).collect()
    }
}

/// Run the full pipeline over a source
///
/// # Arguments
/// * `source` - Audio source positioned at the start of the track
/// * `config` - Window length and FFT minimum
/// * `model` - Trained onset model, if any
/// * `cancel` - Cooperative cancellation
pub fn analyze_source(
    source: &mut dyn AudioSource,
    config: &AnalysisConfig,
    model: Option<&OnsetModel>,
    cancel: &CancelToken,
) -> Result<TrackAnalysis, AnalysisError> {
    let extractor = FeatureExtractor::from_config(config);
    let frames = extractor.extract_from_source(source, cancel)?;
    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }

    let mut analysis = TrackAnalysis::from_frames(frames, extractor.window_ms(), model);
    let reported = source.info().total_duration_secs;
    if reported > 0.0 {
        analysis.duration_secs = reported;
    }
    Ok(analysis)
}

/// Run the pipeline over a WAV file
///
/// A file that cannot be opened or decoded yields an empty analysis rather
/// than an error; only cancellation is reported.
pub fn analyze_path<P: AsRef<Path>>(
    path: P,
    config: &AnalysisConfig,
    model: Option<&OnsetModel>,
    cancel: &CancelToken,
) -> Result<TrackAnalysis, AnalysisError> {
    let path = path.as_ref();
    let mut source = match WavSource::open(path) {
        Ok(source) => source,
        Err(err) => {
            log_transport_error(&err, "analyze_path");
            log::warn!("[Analysis] {:?} unavailable, continuing without audio", path);
            return Ok(TrackAnalysis::unavailable(config.window_ms));
        }
    };

    match analyze_source(&mut source, config, model, cancel) {
        Err(AnalysisError::Cancelled) => Err(AnalysisError::Cancelled),
        Err(err) => {
            log::warn!("[Analysis] Decoding {:?} failed: {}", path, err);
            Ok(TrackAnalysis::unavailable(config.window_ms))
        }
        Ok(analysis) => Ok(analysis),
    }
}
