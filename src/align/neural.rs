// Neural-guided search - onset probabilities around the text estimate
//
// For each line:
// 1. Estimate a frame from the line's text fraction, never earlier than the
//    previous line's chosen frame
// 2. Score frames within +/- neighborhood as probability - penalty, where the
//    penalty grows linearly for frames earlier than the estimate
// 3. Fall back to the estimate when even the winner is barely an onset

use super::energy::neighborhood_frames;
use super::text::{cumulative_fractions, estimated_index};
use super::LinePlacement;
use crate::analysis::features::FeatureFrame;
use crate::cancel::CancelToken;
use crate::config::AlignmentConfig;
use crate::error::AlignmentError;

/// Place every line using onset probabilities
///
/// # Arguments
/// * `frames` - Feature frames (RMS feeds the intensity flag)
/// * `probabilities` - One smoothed onset probability per frame
/// * `lines` - Text lines in order
/// * `config` - Neighborhood, penalty and intensity settings
/// * `window_ms` - Frame length used to size the neighborhood
///
/// # Returns
/// `Ok(None)` when there is nothing to search, otherwise one placement per line.
pub fn align<S: AsRef<str>>(
    frames: &[FeatureFrame],
    probabilities: &[f64],
    lines: &[S],
    config: &AlignmentConfig,
    window_ms: u32,
    cancel: &CancelToken,
) -> Result<Option<Vec<LinePlacement>>, AlignmentError> {
    let n = frames.len().min(probabilities.len());
    if n == 0 {
        return Ok(None);
    }

    let neighborhood = neighborhood_frames(config, window_ms);
    let penalty_factor = config.penalty_factor();
    let mut last_idx = 0;
    let mut placements = Vec::with_capacity(lines.len());

    for frac in cumulative_fractions(lines) {
        if cancel.is_cancelled() {
            return Err(AlignmentError::Cancelled);
        }

        let estimate = estimated_index(frac, n).max(last_idx);
        let start = estimate.saturating_sub(neighborhood);
        let end = (estimate + neighborhood).min(n - 1);

        let mut best = estimate;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_prob = 0.0;
        for (w, &prob) in probabilities.iter().enumerate().take(end + 1).skip(start) {
            let penalty = if w < estimate {
                penalty_factor * (estimate - w) as f64 / neighborhood as f64
            } else {
                0.0
            };
            let score = prob - penalty;
            if score > best_score {
                best_score = score;
                best = w;
                best_prob = prob;
            }
        }

        if best_prob < config.low_confidence_floor {
            best = estimate;
            best_prob = probabilities[estimate];
        }

        let is_intense =
            best_prob > config.intense_probability && frames[best].rms() > config.intense_min_rms;
        placements.push(LinePlacement {
            frame_index: best,
            is_intense,
        });
        last_idx = best;
    }

    tracing::debug!(lines = placements.len(), frames = n, "neural placement done");
    Ok(Some(placements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::FeatureVector;

    fn frames(n: usize, rms: f64) -> Vec<FeatureFrame> {
        (0..n)
            .map(|i| FeatureFrame {
                timestamp_secs: i as f64 * 0.05,
                features: FeatureVector {
                    rms,
                    ..FeatureVector::default()
                },
            })
            .collect()
    }

    fn run(probabilities: &[f64], lines: &[&str], rms: f64) -> Vec<LinePlacement> {
        align(
            &frames(probabilities.len(), rms),
            probabilities,
            lines,
            &AlignmentConfig::default(),
            50,
            &CancelToken::new(),
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_snaps_to_nearby_onset() {
        // 21 frames, one line ending at 1.0 -> estimate 20; onset at 18
        let mut probs = vec![0.1; 21];
        probs[18] = 0.9;
        let placements = run(&probs, &["only line"], 0.5);

        // score(18) = 0.9 - 0.5 * 2 / 4 = 0.65 beats 0.1 at the estimate
        assert_eq!(placements[0].frame_index, 18);
        assert!(placements[0].is_intense);
    }

    #[test]
    fn test_penalty_discourages_early_frames() {
        // Equal probabilities before and after: the later one wins
        let mut probs = vec![0.0; 41];
        probs[16] = 0.6;
        probs[22] = 0.6;
        let placements = run(&probs, &["ab", "ab"], 0.1);

        // Line 1 estimate = round(0.5 * 40) = 20
        assert_eq!(placements[0].frame_index, 22);
    }

    #[test]
    fn test_low_confidence_uses_estimate() {
        let probs = vec![0.01; 41];
        let placements = run(&probs, &["ab", "ab"], 0.5);
        assert_eq!(placements[0].frame_index, 20);
        assert_eq!(placements[1].frame_index, 40);
        assert!(placements.iter().all(|p| !p.is_intense));
    }

    #[test]
    fn test_intense_requires_energy() {
        let mut probs = vec![0.0; 21];
        probs[20] = 0.95;
        let quiet = run(&probs, &["x"], 0.1);
        assert_eq!(quiet[0].frame_index, 20);
        assert!(!quiet[0].is_intense);
    }

    #[test]
    fn test_never_moves_before_previous_line() {
        // Strong onset early on, weak ones later
        let mut probs = vec![0.06; 41];
        probs[2] = 1.0;
        let placements = run(&probs, &["a", "a", "a", "a"], 0.1);
        for pair in placements.windows(2) {
            assert!(pair[0].frame_index <= pair[1].frame_index);
        }
    }

    #[test]
    fn test_empty_input_is_unusable() {
        let result = align::<&str>(
            &[],
            &[],
            &["a"],
            &AlignmentConfig::default(),
            50,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(result.is_none());
    }
}
