// Temporal module - Time-domain feature extraction
//
// Amplitude statistics computed straight from the mono window.

/// Root mean square: sqrt(mean(x^2)); 0.0 for an empty window
pub fn rms(window: &[f64]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = window.iter().map(|&x| x * x).sum();
    (sum_sq / window.len() as f64).sqrt()
}

/// Zero-crossing rate: sign changes divided by window length
///
/// Uses a three-way sign (negative, zero, positive), so a run of exact
/// zeros never counts as crossings.
pub fn zero_crossing_rate(window: &[f64]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let crossings = window
        .windows(2)
        .filter(|pair| sign(pair[0]) != sign(pair[1]))
        .count();
    crossings as f64 / window.len() as f64
}

/// Largest absolute sample
pub fn peak_abs(window: &[f64]) -> f64 {
    window.iter().fold(0.0, |peak: f64, &x| peak.max(x.abs()))
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_constant() {
        assert!((rms(&[0.5; 100]) - 0.5).abs() < 1e-12);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_zcr_alternating_signal() {
        let alternating: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        // 9 crossings over 10 samples
        assert!((zero_crossing_rate(&alternating) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_zero_counts_as_its_own_sign() {
        assert_eq!(zero_crossing_rate(&[0.0; 32]), 0.0);
        // 1 -> 0 -> -1 is two changes
        assert!((zero_crossing_rate(&[1.0, 0.0, -1.0]) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_peak_abs_uses_magnitude() {
        assert_eq!(peak_abs(&[0.1, -0.7, 0.3]), 0.7);
        assert_eq!(peak_abs(&[]), 0.0);
    }
}
