// DTW offset - how far the audio runs ahead of or behind the text estimate
//
// The text side is a synthetic impulse train (1.0 at each line's estimated
// frame, 0.0 elsewhere); the audio side is the RMS sequence scaled to [0, 1].
// Classic DTW with |a - b| local cost aligns the two, restricted to a
// Sakoe-Chiba band so memory stays linear in track length. For each impulse
// the backtracked path tells which audio frame it landed on; the mean
// displacement times the window length is the offset.
//
// When no impulse lands on audible energy the path carries no information,
// and a brute-force shift search over the impulse train takes over.

use super::energy::{neighborhood_frames, IntensityRule};
use super::text::estimated_indices;
use super::LinePlacement;
use crate::analysis::features::FeatureFrame;
use crate::cancel::CancelToken;
use crate::config::AlignmentConfig;
use crate::error::AlignmentError;

/// How an offset was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OffsetMethod {
    /// Mean displacement of impulses matched on the DTW path
    WarpingPath,
    /// Best co-occurrence shift after the path matched nothing
    CrossCorrelation,
}

/// Result of one offset estimation
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetEstimate {
    /// Positive when the audio lags the text estimate
    pub offset_ms: f64,
    pub method: OffsetMethod,
    /// Audio frame matched to each impulse, if it landed on energy
    pub matched: Vec<Option<usize>>,
    /// Offset expressed in frames
    pub shift_frames: f64,
}

impl OffsetEstimate {
    pub fn matched_count(&self) -> usize {
        self.matched.iter().filter(|m| m.is_some()).count()
    }
}

/// Unit impulses at `positions` in a sequence of `len` zeros
pub fn impulse_train(len: usize, positions: &[usize]) -> Vec<f64> {
    let mut train = vec![0.0; len];
    for &p in positions {
        if p < len {
            train[p] = 1.0;
        }
    }
    train
}

/// Scale a sequence into [0, 1] by its maximum; all zeros when silent
pub fn normalize_energy(energy: &[f64]) -> Vec<f64> {
    let max = energy
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; energy.len()];
    }
    energy
        .iter()
        .map(|&v| if v.is_finite() { (v / max).max(0.0) } else { 0.0 })
        .collect()
}

/// Banded cumulative cost matrix
///
/// Row i stores columns i - band ..= i + band; anything outside is infinite.
struct BandedCost {
    rows: usize,
    cols: usize,
    band: usize,
    cells: Vec<f64>,
}

impl BandedCost {
    fn new(rows: usize, cols: usize, band: usize) -> Self {
        let width = 2 * band + 1;
        Self {
            rows,
            cols,
            band,
            cells: vec![f64::INFINITY; rows * width],
        }
    }

    fn slot(&self, i: usize, j: usize) -> Option<usize> {
        if i >= self.rows || j >= self.cols || i.abs_diff(j) > self.band {
            return None;
        }
        Some(i * (2 * self.band + 1) + (j + self.band - i))
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.slot(i, j).map_or(f64::INFINITY, |s| self.cells[s])
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        if let Some(s) = self.slot(i, j) {
            self.cells[s] = value;
        }
    }
}

/// Optimal warping path from (0, 0) to (len(a)-1, len(b)-1)
///
/// Moves are diagonal, vertical (advance `a`) and horizontal (advance `b`);
/// backtracking prefers the diagonal on ties. `band` limits |i - j|; it is
/// widened as needed so the end cell is reachable.
pub fn warping_path(
    a: &[f64],
    b: &[f64],
    band: usize,
    cancel: &CancelToken,
) -> Result<Vec<(usize, usize)>, AlignmentError> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return Ok(Vec::new());
    }
    let band = band.max(n.abs_diff(m)).min(n.max(m));
    let mut cost = BandedCost::new(n, m, band);

    for i in 0..n {
        if cancel.is_cancelled() {
            return Err(AlignmentError::Cancelled);
        }
        let lo = i.saturating_sub(band);
        let hi = (i + band).min(m - 1);
        for j in lo..=hi {
            let local = (a[i] - b[j]).abs();
            let previous = if i == 0 && j == 0 {
                0.0
            } else {
                let diag = if i > 0 && j > 0 { cost.get(i - 1, j - 1) } else { f64::INFINITY };
                let up = if i > 0 { cost.get(i - 1, j) } else { f64::INFINITY };
                let left = if j > 0 { cost.get(i, j - 1) } else { f64::INFINITY };
                diag.min(up).min(left)
            };
            cost.set(i, j, local + previous);
        }
    }

    let (mut i, mut j) = (n - 1, m - 1);
    let mut path = vec![(i, j)];
    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let diag = cost.get(i - 1, j - 1);
            let up = cost.get(i - 1, j);
            let left = cost.get(i, j - 1);
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path.push((i, j));
    }
    path.reverse();
    Ok(path)
}

/// Estimate the offset between impulses and audio energy
///
/// # Arguments
/// * `energy` - Per-frame RMS (any scale)
/// * `impulses` - Frame index of each text impulse
/// * `window_ms` - Frame length
/// * `config` - Band width, match floor and cross-correlation range
///
/// # Returns
/// `Ok(None)` when there are no frames or no impulses.
pub fn estimate_offset(
    energy: &[f64],
    impulses: &[usize],
    window_ms: u32,
    config: &AlignmentConfig,
    cancel: &CancelToken,
) -> Result<Option<OffsetEstimate>, AlignmentError> {
    let n = energy.len();
    if n == 0 || impulses.is_empty() {
        return Ok(None);
    }

    let audio = normalize_energy(energy);
    let text = impulse_train(n, impulses);
    let window = window_ms.max(1);
    let band = (config.dtw_band_ms / window).max(1) as usize;
    let path = warping_path(&text, &audio, band, cancel)?;

    // Row p of the path: pick the loudest audio frame it touches
    let mut matched: Vec<Option<usize>> = Vec::with_capacity(impulses.len());
    for &p in impulses {
        let best = path
            .iter()
            .filter(|&&(i, _)| i == p)
            .map(|&(_, j)| j)
            .max_by(|&x, &y| audio[x].total_cmp(&audio[y]).then(y.cmp(&x)));
        matched.push(best.filter(|&j| audio[j] >= config.dtw_match_floor));
    }

    let displacements: Vec<f64> = impulses
        .iter()
        .zip(matched.iter())
        .filter_map(|(&p, m)| m.map(|j| j as f64 - p as f64))
        .collect();

    if !displacements.is_empty() {
        let shift = displacements.iter().sum::<f64>() / displacements.len() as f64;
        tracing::debug!(
            matched = displacements.len(),
            impulses = impulses.len(),
            shift,
            "dtw offset from warping path"
        );
        return Ok(Some(OffsetEstimate {
            offset_ms: shift * window as f64,
            method: OffsetMethod::WarpingPath,
            matched,
            shift_frames: shift,
        }));
    }

    let max_shift = (config.max_shift_ms / window) as i64;
    let shift = best_shift(&audio, impulses, max_shift, config.dtw_match_floor);
    tracing::debug!(shift, "dtw path matched nothing, using cross-correlation");

    let matched = impulses
        .iter()
        .map(|&p| {
            let j = p as i64 + shift;
            (j >= 0 && (j as usize) < n && audio[j as usize] >= config.dtw_match_floor)
                .then_some(j as usize)
        })
        .collect();

    Ok(Some(OffsetEstimate {
        offset_ms: shift as f64 * window as f64,
        method: OffsetMethod::CrossCorrelation,
        matched,
        shift_frames: shift as f64,
    }))
}

/// Shift within +/- `max_shift` frames maximizing impulse/energy co-occurrence
///
/// Ties go to the smallest |shift|.
fn best_shift(audio: &[f64], impulses: &[usize], max_shift: i64, floor: f64) -> i64 {
    let n = audio.len() as i64;
    let mut best = 0i64;
    let mut best_score = 0usize;

    for shift in -max_shift..=max_shift {
        let score = impulses
            .iter()
            .filter(|&&p| {
                let j = p as i64 + shift;
                j >= 0 && j < n && audio[j as usize] >= floor
            })
            .count();
        if score > best_score || (score == best_score && shift.abs() < best.abs()) {
            best = shift;
            best_score = score;
        }
    }
    best
}

/// Offset of `lines` against per-frame energy, impulses placed by text fraction
pub fn offset_for_lines<S: AsRef<str>>(
    energy: &[f64],
    lines: &[S],
    window_ms: u32,
    config: &AlignmentConfig,
    cancel: &CancelToken,
) -> Result<Option<OffsetEstimate>, AlignmentError> {
    let impulses = estimated_indices(lines, energy.len());
    estimate_offset(energy, &impulses, window_ms, config, cancel)
}

/// Place every line through the DTW offset
///
/// Matched impulses keep their matched frame; the rest move by the mean
/// shift. Indices never decrease from one line to the next.
///
/// # Returns
/// `Ok(None)` when there are no frames or no lines, otherwise the placements
/// and the offset they were derived from.
pub fn align<S: AsRef<str>>(
    frames: &[FeatureFrame],
    lines: &[S],
    config: &AlignmentConfig,
    window_ms: u32,
    cancel: &CancelToken,
) -> Result<Option<(Vec<LinePlacement>, OffsetEstimate)>, AlignmentError> {
    let n = frames.len();
    if n == 0 || lines.is_empty() {
        return Ok(None);
    }

    let energy: Vec<f64> = frames.iter().map(FeatureFrame::rms).collect();
    let impulses = estimated_indices(lines, n);
    let estimate = match estimate_offset(&energy, &impulses, window_ms, config, cancel)? {
        Some(estimate) => estimate,
        None => return Ok(None),
    };

    let rule = IntensityRule::new(frames, neighborhood_frames(config, window_ms), config);
    let shift = estimate.shift_frames.round() as i64;
    let mut previous = 0;
    let placements = impulses
        .iter()
        .zip(estimate.matched.iter())
        .map(|(&p, matched)| {
            let idx = matched
                .unwrap_or_else(|| (p as i64 + shift).clamp(0, n as i64 - 1) as usize)
                .max(previous);
            previous = idx;
            LinePlacement {
                frame_index: idx,
                is_intense: rule.is_intense(frames, idx),
            }
        })
        .collect();

    Ok(Some((placements, estimate)))
}
