// Text fractions - where each line should fall if text and audio progressed evenly
//
// Every line weighs max(1, character count). A line's fraction is the
// cumulative weight up to and including that line divided by the total, so
// the last line always maps to 1.0.

/// Cumulative character fraction for each line
pub fn cumulative_fractions<S: AsRef<str>>(lines: &[S]) -> Vec<f64> {
    let weights: Vec<f64> = lines
        .iter()
        .map(|line| line.as_ref().chars().count().max(1) as f64)
        .collect();
    let total: f64 = weights.iter().sum::<f64>().max(1.0);

    let mut acc = 0.0;
    weights
        .into_iter()
        .map(|w| {
            acc += w;
            acc / total
        })
        .collect()
}

/// Frame index matching a text fraction: round(fraction * (frames - 1))
pub fn estimated_index(fraction: f64, frame_count: usize) -> usize {
    if frame_count == 0 {
        return 0;
    }
    let idx = (fraction.clamp(0.0, 1.0) * (frame_count - 1) as f64).round() as usize;
    idx.min(frame_count - 1)
}

/// Estimated frame index of every line
pub fn estimated_indices<S: AsRef<str>>(lines: &[S], frame_count: usize) -> Vec<usize> {
    cumulative_fractions(lines)
        .into_iter()
        .map(|frac| estimated_index(frac, frame_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractions_weight_by_characters() {
        let fractions = cumulative_fractions(&["ab", "abcd", "ab"]);
        assert_eq!(fractions, vec![0.25, 0.75, 1.0]);
    }

    #[test]
    fn test_empty_line_weighs_one() {
        let fractions = cumulative_fractions(&["", "abc"]);
        assert_eq!(fractions, vec![0.25, 1.0]);
    }

    #[test]
    fn test_characters_not_bytes() {
        let fractions = cumulative_fractions(&["日本", "ab"]);
        assert_eq!(fractions, vec![0.5, 1.0]);
    }

    #[test]
    fn test_estimated_index() {
        assert_eq!(estimated_index(0.5, 101), 50);
        assert_eq!(estimated_index(1.0, 101), 100);
        assert_eq!(estimated_index(0.0, 101), 0);
        assert_eq!(estimated_index(0.7, 0), 0);
        assert_eq!(estimated_indices(&["ab", "ab"], 11), vec![5, 10]);
    }
}
