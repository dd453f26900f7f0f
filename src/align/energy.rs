// Energy-cumulative mapping - no model required
//
// The cumulative RMS curve says how much of the track's energy has gone by at
// each frame. A line whose text fraction is f lands on the first frame where
// the energy fraction reaches f. Loud passages therefore absorb more lines
// than quiet ones.

use super::text::cumulative_fractions;
use super::LinePlacement;
use crate::analysis::features::FeatureFrame;
use crate::cancel::CancelToken;
use crate::config::AlignmentConfig;
use crate::error::AlignmentError;

/// Total energy below this is treated as silence
const MIN_TOTAL_ENERGY: f64 = 1e-9;

/// Normalized cumulative energy curve, or `None` for a silent track
pub fn cumulative_energy(energy: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = energy.iter().sum();
    if !total.is_finite() || total <= MIN_TOTAL_ENERGY {
        return None;
    }

    let mut acc = 0.0;
    Some(
        energy
            .iter()
            .map(|&e| {
                acc += e;
                acc / total
            })
            .collect(),
    )
}

/// Intensity rule shared by the energy and DTW strategies
///
/// A frame is intense when the loudest peak within `radius` frames reaches
/// `intense_peak_ratio` of the track's global peak and its RMS reaches
/// `intense_relative_rms` times the mean RMS.
pub(crate) struct IntensityRule {
    global_peak: f64,
    mean_rms: f64,
    radius: usize,
    peak_ratio: f64,
    relative_rms: f64,
}

impl IntensityRule {
    pub(crate) fn new(frames: &[FeatureFrame], radius: usize, config: &AlignmentConfig) -> Self {
        let global_peak = frames
            .iter()
            .fold(0.0_f64, |acc, f| acc.max(f.features.peak_abs));
        let mean_rms = if frames.is_empty() {
            0.0
        } else {
            frames.iter().map(FeatureFrame::rms).sum::<f64>() / frames.len() as f64
        };
        Self {
            global_peak,
            mean_rms,
            radius,
            peak_ratio: config.intense_peak_ratio,
            relative_rms: config.intense_relative_rms,
        }
    }

    pub(crate) fn is_intense(&self, frames: &[FeatureFrame], idx: usize) -> bool {
        if frames.is_empty() || self.global_peak <= 0.0 {
            return false;
        }
        let idx = idx.min(frames.len() - 1);
        let lo = idx.saturating_sub(self.radius);
        let hi = (idx + self.radius).min(frames.len() - 1);
        let local_peak = frames[lo..=hi]
            .iter()
            .fold(0.0_f64, |acc, f| acc.max(f.features.peak_abs));

        local_peak >= self.peak_ratio * self.global_peak
            && frames[idx].rms() >= self.relative_rms * self.mean_rms
    }
}

/// Place every line on the energy curve
///
/// # Returns
/// `Ok(None)` when the track is silent (strategy unusable), otherwise one
/// placement per line with non-decreasing frame indices.
pub fn align<S: AsRef<str>>(
    frames: &[FeatureFrame],
    lines: &[S],
    config: &AlignmentConfig,
    window_ms: u32,
    cancel: &CancelToken,
) -> Result<Option<Vec<LinePlacement>>, AlignmentError> {
    let energy: Vec<f64> = frames.iter().map(FeatureFrame::rms).collect();
    let curve = match cumulative_energy(&energy) {
        Some(curve) => curve,
        None => return Ok(None),
    };

    let radius = neighborhood_frames(config, window_ms);
    let rule = IntensityRule::new(frames, radius, config);
    let last = curve.len() - 1;
    let mut previous = 0;
    let mut placements = Vec::with_capacity(lines.len());

    for frac in cumulative_fractions(lines) {
        if cancel.is_cancelled() {
            return Err(AlignmentError::Cancelled);
        }
        let idx = curve.partition_point(|&c| c < frac).min(last).max(previous);
        placements.push(LinePlacement {
            frame_index: idx,
            is_intense: rule.is_intense(frames, idx),
        });
        previous = idx;
    }

    Ok(Some(placements))
}

pub(crate) fn neighborhood_frames(config: &AlignmentConfig, window_ms: u32) -> usize {
    ((config.neighborhood_ms / window_ms.max(1)) as usize).max(1)
}
