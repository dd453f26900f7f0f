//! Configuration management for analysis and alignment tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. The alignment heuristics
//! (neighborhood search penalty, "intense" thresholds, tie increments) are
//! empirically chosen and live here so they can be tuned per deployment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub training: TrainingConfig,
    pub alignment: AlignmentConfig,
    pub resync: ResyncConfig,
    pub visualizer: VisualizerConfig,
    pub storage: StorageConfig,
}

/// Frame-based feature extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analysis window length in milliseconds (non-overlapping)
    pub window_ms: u32,
    /// Smallest FFT length used for the spectral centroid
    pub min_fft_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_ms: 50,
            min_fft_size: 64,
        }
    }
}

/// Onset model training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub hidden_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Seed for weight initialisation and per-epoch shuffling
    pub seed: u64,
    /// Width of the uniform initialisation range centred on zero
    pub init_range: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hidden_size: 16,
            epochs: 20,
            learning_rate: 0.01,
            seed: 0,
            init_range: 0.2,
        }
    }
}

/// Line alignment heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Half-width of the neural search neighborhood
    pub neighborhood_ms: u32,
    /// Maximum penalty applied to candidates earlier than the estimate (0..=1)
    pub early_penalty_factor: f64,
    /// Below this winning probability the raw estimate is used instead
    pub low_confidence_floor: f64,
    /// Neural "intense" flag: winning probability must exceed this
    pub intense_probability: f64,
    /// Neural "intense" flag: frame RMS must exceed this
    pub intense_min_rms: f64,
    /// Energy "intense" flag: local peak must reach this share of the global peak
    pub intense_peak_ratio: f64,
    /// Energy "intense" flag: frame RMS must reach this multiple of the mean RMS
    pub intense_relative_rms: f64,
    /// Increment applied to out-of-order or duplicate timestamps
    pub tie_increment_ms: u32,
    /// Line spacing used when no audio analysis is available
    pub uniform_spacing_ms: u32,
    /// Cross-correlation fallback searches shifts within +/- this range
    pub max_shift_ms: u32,
    /// Sakoe-Chiba band half-width for DTW
    pub dtw_band_ms: u32,
    /// Minimum normalized energy for an impulse to count as matched on the DTW path
    pub dtw_match_floor: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            neighborhood_ms: 200,
            early_penalty_factor: 0.5,
            low_confidence_floor: 0.05,
            intense_probability: 0.8,
            intense_min_rms: 0.2,
            intense_peak_ratio: 0.6,
            intense_relative_rms: 1.2,
            tie_increment_ms: 80,
            uniform_spacing_ms: 3000,
            max_shift_ms: 3000,
            dtw_band_ms: 3000,
            dtw_match_floor: 0.1,
        }
    }
}

impl AlignmentConfig {
    /// Early penalty clamped to its valid range
    pub fn penalty_factor(&self) -> f64 {
        if self.early_penalty_factor.is_finite() {
            self.early_penalty_factor.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Periodic offset re-estimation during playback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResyncConfig {
    pub interval_ms: u64,
    /// Weight kept from the previous offset on each update (close to 1)
    pub smoothing_alpha: f64,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            smoothing_alpha: 0.85,
        }
    }
}

/// Real-time spectrum visualizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Transform size in samples (rounded up to a power of two)
    pub fft_size: usize,
    pub band_count: usize,
    pub min_frequency_hz: f64,
    /// Gain applied before the tanh compression
    pub compression_gain: f64,
    /// Weight kept from the previous band value (0 disables smoothing)
    pub temporal_smoothing: f64,
    /// Pre-allocated band frames shared between capture and consumer
    pub frame_pool_size: usize,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            band_count: 32,
            min_frequency_hz: 20.0,
            compression_gain: 2.5,
            temporal_smoothing: 0.5,
            frame_pool_size: 8,
        }
    }
}

/// Locations of the persisted model and training corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub model_file: String,
    pub corpus_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            model_file: "aligner_model.json".to_string(),
            corpus_file: "training.jsonl".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn model_path(&self) -> PathBuf {
        self.data_dir.join(&self.model_file)
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.data_dir.join(&self.corpus_file)
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration; if the file doesn't exist or the JSON is
    /// invalid, logs a warning and returns the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the conventional location
    pub fn load() -> Self {
        Self::load_from_file("assets/lyric_sync.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.analysis.window_ms, 50);
        assert_eq!(config.training.hidden_size, 16);
        assert_eq!(config.alignment.tie_increment_ms, 80);
        assert_eq!(config.resync.smoothing_alpha, 0.85);
        assert_eq!(config.visualizer.band_count, 32);
        assert_eq!(
            config.storage.model_path(),
            PathBuf::from("data").join("aligner_model.json")
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.analysis.window_ms, config.analysis.window_ms);
        assert_eq!(
            parsed.alignment.neighborhood_ms,
            config.alignment.neighborhood_ms
        );
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "alignment": { "early_penalty_factor": 0.25 } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.alignment.early_penalty_factor, 0.25);
        assert_eq!(parsed.alignment.low_confidence_floor, 0.05);
        assert_eq!(parsed.training.epochs, 20);
    }

    #[test]
    fn test_penalty_factor_is_capped() {
        let mut config = AlignmentConfig::default();
        config.early_penalty_factor = 3.0;
        assert_eq!(config.penalty_factor(), 1.0);
        config.early_penalty_factor = -1.0;
        assert_eq!(config.penalty_factor(), 0.0);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_file("/definitely/not/here.json");
        assert_eq!(config.analysis.window_ms, 50);
    }
}
