// Band layout - log-spaced frequency buckets over a half spectrum

/// Precomputed FFT bin ranges for each log-spaced band
///
/// Band edges are geometric between `min_hz` and Nyquist. Each band covers
/// bins `floor(f0 / bin_width) ..= ceil(f1 / bin_width)`, clamped to the half
/// spectrum, so neighbouring bands may share an edge bin.
#[derive(Debug, Clone)]
pub struct BandLayout {
    edges_hz: Vec<f64>,
    ranges: Vec<(usize, usize)>,
}

impl BandLayout {
    pub fn new(band_count: usize, min_hz: f64, sample_rate: u32, fft_size: usize) -> Self {
        let band_count = band_count.max(1);
        let sample_rate = sample_rate.max(1) as f64;
        let half = (fft_size / 2).max(1);
        let bin_width = sample_rate / fft_size.max(1) as f64;

        let log_min = min_hz.max(1.0).log10();
        let log_max = (sample_rate / 2.0).log10().max(log_min + 1e-6);

        let edges_hz: Vec<f64> = (0..=band_count)
            .map(|i| {
                let frac = i as f64 / band_count as f64;
                10f64.powf(log_min + (log_max - log_min) * frac)
            })
            .collect();

        let ranges = edges_hz
            .windows(2)
            .map(|edge| {
                let lo = ((edge[0] / bin_width).floor() as usize).min(half - 1);
                let hi = ((edge[1] / bin_width).ceil() as usize).min(half - 1);
                (lo, hi.max(lo))
            })
            .collect();

        Self { edges_hz, ranges }
    }

    pub fn band_count(&self) -> usize {
        self.ranges.len()
    }

    /// Inclusive bin range of a band
    pub fn bin_range(&self, band: usize) -> Option<(usize, usize)> {
        self.ranges.get(band).copied()
    }

    /// Band whose frequency edges contain `hz`, if it lies inside the layout
    pub fn band_for_frequency(&self, hz: f64) -> Option<usize> {
        let first = *self.edges_hz.first()?;
        let last = *self.edges_hz.last()?;
        if !hz.is_finite() || hz < first || hz > last {
            return None;
        }
        let idx = self.edges_hz.partition_point(|&edge| edge <= hz);
        Some(idx.saturating_sub(1).min(self.band_count() - 1))
    }

    /// Mean magnitude of each band's bins
    ///
    /// `out` must hold `band_count()` values; bins past the end of
    /// `magnitudes` are ignored.
    pub fn accumulate(&self, magnitudes: &[f64], out: &mut [f64]) {
        for (value, &(lo, hi)) in out.iter_mut().zip(self.ranges.iter()) {
            if lo >= magnitudes.len() {
                *value = 0.0;
                continue;
            }
            let hi = hi.min(magnitudes.len() - 1);
            let bins = &magnitudes[lo..=hi];
            *value = bins.iter().sum::<f64>() / bins.len().max(1) as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_log_spaced() {
        let layout = BandLayout::new(32, 20.0, 48000, 1024);
        assert_eq!(layout.band_count(), 32);

        let ratio0 = layout.edges_hz[1] / layout.edges_hz[0];
        let ratio1 = layout.edges_hz[20] / layout.edges_hz[19];
        assert!((ratio0 - ratio1).abs() < 1e-9);
        assert!((layout.edges_hz[0] - 20.0).abs() < 1e-9);
        assert!((layout.edges_hz[32] - 24000.0).abs() < 1e-6);
    }

    #[test]
    fn test_ranges_stay_inside_half_spectrum() {
        let layout = BandLayout::new(32, 20.0, 44100, 1024);
        for band in 0..layout.band_count() {
            let (lo, hi) = layout.bin_range(band).unwrap();
            assert!(lo <= hi);
            assert!(hi < 512);
        }
    }

    #[test]
    fn test_band_for_frequency() {
        let layout = BandLayout::new(32, 20.0, 48000, 1024);
        assert_eq!(layout.band_for_frequency(20.5), Some(0));
        assert_eq!(layout.band_for_frequency(23990.0), Some(31));
        assert_eq!(layout.band_for_frequency(10.0), None);
        assert_eq!(layout.band_for_frequency(f64::NAN), None);

        let low = layout.band_for_frequency(100.0).unwrap();
        let high = layout.band_for_frequency(5000.0).unwrap();
        assert!(low < high);
    }

    #[test]
    fn test_accumulate_takes_band_mean() {
        let layout = BandLayout::new(4, 20.0, 8000, 64);
        let mags = vec![1.0; 32];
        let mut out = vec![0.0; 4];
        layout.accumulate(&mags, &mut out);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-12));
    }
}
