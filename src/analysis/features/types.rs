// Types module - Data structures for per-window audio features
//
// This module defines the values produced by the feature extractor and
// consumed by the onset model and the line aligner.

use serde::{Deserialize, Serialize};

/// Number of values in a [`FeatureVector`]
pub const FEATURE_DIMENSIONS: usize = 4;

/// Features extracted from one analysis window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Root mean square amplitude
    pub rms: f64,

    /// Sign changes divided by window length
    ///
    /// Zero is its own sign, so an all-zero window has no crossings.
    pub zero_crossing_rate: f64,

    /// Magnitude-weighted mean bin index divided by half the padded length
    ///
    /// 0.0 when the window carries no spectral energy.
    pub spectral_centroid: f64,

    /// Largest absolute sample in the window
    pub peak_abs: f64,
}

impl FeatureVector {
    /// Values in model input order: rms, zcr, centroid, peak
    pub fn to_array(&self) -> [f64; FEATURE_DIMENSIONS] {
        [
            self.rms,
            self.zero_crossing_rate,
            self.spectral_centroid,
            self.peak_abs,
        ]
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.to_array().to_vec()
    }
}

/// A feature vector paired with the start time of its window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFrame {
    pub timestamp_secs: f64,
    pub features: FeatureVector,
}

impl FeatureFrame {
    pub fn rms(&self) -> f64 {
        self.features.rms
    }
}
