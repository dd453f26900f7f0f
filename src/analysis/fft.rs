// FFT module - iterative radix-2 Cooley-Tukey transform
//
// Shared by the offline feature extractor (spectral centroid) and the
// real-time visualizer. The transform works in place on power-of-two length
// buffers: a bit-reversal permutation followed by log2(n) butterfly stages.
//
// Two entry points:
// - `transform` / `inverse_transform`: free functions, no allocation, stage
//   twiddles derived on the fly
// - `Radix2Fft`: a plan that precomputes the twiddle table once, for callers
//   that run the same length repeatedly (the capture callback)

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

use crate::error::AnalysisError;

/// Complex sample type used throughout the analysis pipeline
pub type Complex64 = Complex<f64>;

/// Forward DFT in place
///
/// # Errors
/// `AnalysisError::InvalidFftLength` if the buffer length is not a power of
/// two. The caller is expected to zero-pad beforehand.
pub fn transform(buffer: &mut [Complex64]) -> Result<(), AnalysisError> {
    let n = buffer.len();
    check_length(n)?;
    if n == 1 {
        return Ok(());
    }

    bit_reverse_permute(buffer);

    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let theta = -2.0 * PI / size as f64;
        let step = Complex64::new(theta.cos(), theta.sin());

        for start in (0..n).step_by(size) {
            let mut w = Complex64::new(1.0, 0.0);
            for j in 0..half {
                let t = w * buffer[start + j + half];
                let u = buffer[start + j];
                buffer[start + j] = u + t;
                buffer[start + j + half] = u - t;
                w *= step;
            }
        }
        size <<= 1;
    }

    Ok(())
}

/// Inverse DFT in place (scaled by 1/n), via the conjugation identity
pub fn inverse_transform(buffer: &mut [Complex64]) -> Result<(), AnalysisError> {
    check_length(buffer.len())?;

    for c in buffer.iter_mut() {
        *c = c.conj();
    }
    transform(buffer)?;

    let scale = 1.0 / buffer.len() as f64;
    for c in buffer.iter_mut() {
        *c = c.conj() * scale;
    }
    Ok(())
}

/// Smallest power of two that is >= `len` and >= `minimum`
pub fn padded_length(len: usize, minimum: usize) -> usize {
    len.max(minimum).max(1).next_power_of_two()
}

fn check_length(n: usize) -> Result<(), AnalysisError> {
    if n.is_power_of_two() {
        Ok(())
    } else {
        Err(AnalysisError::InvalidFftLength { len: n })
    }
}

fn bit_reverse_permute(buffer: &mut [Complex64]) {
    let n = buffer.len();
    let shift = usize::BITS - n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> shift;
        if j > i {
            buffer.swap(i, j);
        }
    }
}

/// Reusable radix-2 plan with a precomputed twiddle table
///
/// `process` performs no allocation, which makes it safe to call from an
/// audio callback once the plan exists.
#[derive(Debug, Clone)]
pub struct Radix2Fft {
    len: usize,
    /// e^{-2*pi*i*k/len} for k in 0..len/2
    twiddles: Vec<Complex64>,
}

impl Radix2Fft {
    pub fn new(len: usize) -> Result<Self, AnalysisError> {
        check_length(len)?;

        let twiddles = (0..len / 2)
            .map(|k| {
                let theta = -2.0 * PI * k as f64 / len as f64;
                Complex64::new(theta.cos(), theta.sin())
            })
            .collect();

        Ok(Self { len, twiddles })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forward transform of a buffer whose length matches the plan
    pub fn process(&self, buffer: &mut [Complex64]) -> Result<(), AnalysisError> {
        if buffer.len() != self.len {
            return Err(AnalysisError::InvalidFftLength { len: buffer.len() });
        }
        if self.len == 1 {
            return Ok(());
        }

        bit_reverse_permute(buffer);

        let mut size = 2;
        while size <= self.len {
            let half = size / 2;
            let stride = self.len / size;
            for start in (0..self.len).step_by(size) {
                for j in 0..half {
                    let t = self.twiddles[j * stride] * buffer[start + j + half];
                    let u = buffer[start + j];
                    buffer[start + j] = u + t;
                    buffer[start + j + half] = u - t;
                }
            }
            size <<= 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rustfft::FftPlanner;

    fn random_buffer(len: usize, seed: u64) -> Vec<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect()
    }

    fn assert_close(a: &[Complex64], b: &[Complex64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!(
                (x - y).norm() < tol,
                "bin {} differs: {:?} vs {:?}",
                i,
                x,
                y
            );
        }
    }

    #[test]
    fn test_forward_then_inverse_restores_input() {
        for &len in &[1usize, 2, 4, 8, 64, 1024] {
            let original = random_buffer(len, len as u64);
            let mut buffer = original.clone();

            transform(&mut buffer).unwrap();
            inverse_transform(&mut buffer).unwrap();

            assert_close(&buffer, &original, 1e-9);
        }
    }

    #[test]
    fn test_sine_peaks_at_expected_bins() {
        let n = 256;
        let k = 10;
        let mut buffer: Vec<Complex64> = (0..n)
            .map(|i| {
                let phase = 2.0 * PI * k as f64 * i as f64 / n as f64;
                Complex64::new(phase.sin(), 0.0)
            })
            .collect();

        transform(&mut buffer).unwrap();
        let mags: Vec<f64> = buffer.iter().map(|c| c.norm()).collect();

        // Real sine splits into bins k and n-k with magnitude n/2
        assert!((mags[k] - n as f64 / 2.0).abs() < 1e-6);
        assert!((mags[n - k] - n as f64 / 2.0).abs() < 1e-6);
        for (i, &m) in mags.iter().enumerate() {
            if i != k && i != n - k {
                assert!(m < 1e-6, "unexpected energy {} in bin {}", m, i);
            }
        }
    }

    #[test]
    fn test_matches_rustfft() {
        let len = 512;
        let original = random_buffer(len, 7);

        let mut ours = original.clone();
        transform(&mut ours).unwrap();

        let mut reference = original;
        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_forward(len).process(&mut reference);

        assert_close(&ours, &reference, 1e-9);
    }

    #[test]
    fn test_plan_matches_free_function() {
        let len = 128;
        let original = random_buffer(len, 3);
        let plan = Radix2Fft::new(len).unwrap();

        let mut planned = original.clone();
        plan.process(&mut planned).unwrap();
        let mut direct = original;
        transform(&mut direct).unwrap();

        assert_close(&planned, &direct, 1e-9);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let mut buffer = vec![Complex64::new(0.0, 0.0); 100];
        assert_eq!(
            transform(&mut buffer),
            Err(AnalysisError::InvalidFftLength { len: 100 })
        );
        assert!(Radix2Fft::new(0).is_err());

        let plan = Radix2Fft::new(64).unwrap();
        let mut wrong = vec![Complex64::new(0.0, 0.0); 32];
        assert!(plan.process(&mut wrong).is_err());
    }

    #[test]
    fn test_padded_length() {
        assert_eq!(padded_length(0, 64), 64);
        assert_eq!(padded_length(100, 64), 128);
        assert_eq!(padded_length(2205, 64), 4096);
        assert_eq!(padded_length(1024, 64), 1024);
    }
}
