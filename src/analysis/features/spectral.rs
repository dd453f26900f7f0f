// Spectral module - Frequency-domain feature extraction
//
// The centroid is computed on the zero-padded window: pad to the next power of
// two (never below the configured minimum), transform, then take the
// magnitude-weighted mean over bins 1..half. DC is left out so a constant
// offset does not drag the centroid to zero.

use crate::analysis::fft::{self, padded_length, Complex64};

/// Spectral centroid calculator with a reusable scratch buffer
pub struct SpectralFeatures {
    min_fft_size: usize,
    scratch: Vec<Complex64>,
}

impl SpectralFeatures {
    /// # Arguments
    /// * `min_fft_size` - Smallest transform length used for short windows
    pub fn new(min_fft_size: usize) -> Self {
        Self {
            min_fft_size: min_fft_size.max(2),
            scratch: Vec::new(),
        }
    }

    /// Normalized spectral centroid of a time-domain window
    ///
    /// # Returns
    /// A value in [0, 1): mean bin index divided by half the padded length,
    /// or 0.0 when the spectrum has no energy.
    pub fn compute_centroid(&mut self, window: &[f64]) -> f64 {
        let n = padded_length(window.len(), self.min_fft_size);
        self.scratch.clear();
        self.scratch
            .extend(window.iter().map(|&x| Complex64::new(x, 0.0)));
        self.scratch.resize(n, Complex64::new(0.0, 0.0));

        // n is a power of two by construction
        if fft::transform(&mut self.scratch).is_err() {
            return 0.0;
        }

        let half = n / 2;
        let mut magnitude_sum = 0.0;
        let mut weighted_sum = 0.0;
        for (k, bin) in self.scratch.iter().enumerate().take(half).skip(1) {
            let mag = bin.norm();
            magnitude_sum += mag;
            weighted_sum += k as f64 * mag;
        }

        if magnitude_sum > 1e-9 {
            weighted_sum / magnitude_sum / half as f64
        } else {
            0.0
        }
    }
}
