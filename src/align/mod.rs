// Align module - assigns a timestamp and an intensity flag to every lyric line
//
// Strategies, in priority order:
// 1. Neural: onset probabilities searched around the text estimate
// 2. Energy: cumulative RMS curve matched against cumulative text fraction
// 3. DTW: impulse train warped onto the energy sequence
// 4. Uniform: fixed spacing when there is no audio analysis at all
//
// A strategy that cannot run on the given inputs hands over to the next one.
// Whatever produced the timestamps, the output is sorted and ties are pushed
// forward so timestamps strictly increase.

pub mod dtw;
pub mod energy;
pub mod neural;
pub mod text;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::features::FeatureFrame;
use crate::analysis::TrackAnalysis;
use crate::cancel::CancelToken;
use crate::config::AlignmentConfig;
use crate::error::AlignmentError;
use crate::lyrics::{uniform_timing, LyricLine};

pub use dtw::{OffsetEstimate, OffsetMethod};

/// Frame chosen for one line by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePlacement {
    pub frame_index: usize,
    pub is_intense: bool,
}

/// Strategy requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentStrategy {
    /// Best available: neural, then energy, then DTW
    #[default]
    Auto,
    Neural,
    Energy,
    Dtw,
}

impl AlignmentStrategy {
    /// Strategies to try, most preferred first
    fn chain(self) -> &'static [StrategyUsed] {
        match self {
            AlignmentStrategy::Auto | AlignmentStrategy::Neural => {
                &[StrategyUsed::Neural, StrategyUsed::Energy, StrategyUsed::Dtw]
            }
            AlignmentStrategy::Energy => &[StrategyUsed::Energy, StrategyUsed::Dtw],
            AlignmentStrategy::Dtw => &[StrategyUsed::Dtw],
        }
    }
}

impl FromStr for AlignmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(AlignmentStrategy::Auto),
            "neural" => Ok(AlignmentStrategy::Neural),
            "energy" => Ok(AlignmentStrategy::Energy),
            "dtw" => Ok(AlignmentStrategy::Dtw),
            other => Err(format!(
                "unknown strategy '{}' (expected auto, neural, energy or dtw)",
                other
            )),
        }
    }
}

/// Strategy that actually produced an alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyUsed {
    Neural,
    Energy,
    Dtw,
    Uniform,
}

impl fmt::Display for StrategyUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyUsed::Neural => "neural",
            StrategyUsed::Energy => "energy",
            StrategyUsed::Dtw => "dtw",
            StrategyUsed::Uniform => "uniform",
        };
        f.write_str(name)
    }
}

/// Result of one alignment pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alignment {
    pub lines: Vec<LyricLine>,
    pub strategy: StrategyUsed,
    /// Global offset in milliseconds, reported by the DTW strategy
    pub offset_ms: Option<f64>,
}

/// Line aligner
///
/// Stateless apart from its configuration; one instance can serve any number
/// of passes from any thread.
#[derive(Debug, Clone, Default)]
pub struct LineAligner {
    config: AlignmentConfig,
}

impl LineAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Align `lines` against a track analysis
    ///
    /// # Arguments
    /// * `lines` - Lyric lines in order (blank lines already removed)
    /// * `analysis` - Frames and optional onset probabilities for the track
    /// * `strategy` - Preferred strategy; unusable strategies fall through
    /// * `cancel` - Checked per line and per DTW row
    ///
    /// # Returns
    /// One `LyricLine` per input line with strictly increasing timestamps.
    /// Only cancellation is an error.
    pub fn align<S: AsRef<str>>(
        &self,
        lines: &[S],
        analysis: &TrackAnalysis,
        strategy: AlignmentStrategy,
        cancel: &CancelToken,
    ) -> Result<Alignment, AlignmentError> {
        if lines.is_empty() {
            return Ok(Alignment {
                lines: Vec::new(),
                strategy: StrategyUsed::Uniform,
                offset_ms: None,
            });
        }

        let frames = &analysis.frames;
        let window_ms = analysis.window_ms.max(1);

        for &candidate in strategy.chain() {
            if cancel.is_cancelled() {
                return Err(AlignmentError::Cancelled);
            }

            let (placements, offset_ms) = match candidate {
                StrategyUsed::Neural => match &analysis.probabilities {
                    Some(probs) => (
                        neural::align(frames, probs, lines, &self.config, window_ms, cancel)?,
                        None,
                    ),
                    None => (None, None),
                },
                StrategyUsed::Energy => (
                    energy::align(frames, lines, &self.config, window_ms, cancel)?,
                    None,
                ),
                StrategyUsed::Dtw => {
                    match dtw::align(frames, lines, &self.config, window_ms, cancel)? {
                        Some((placements, estimate)) => {
                            (Some(placements), Some(estimate.offset_ms))
                        }
                        None => (None, None),
                    }
                }
                StrategyUsed::Uniform => (None, None),
            };

            match placements {
                Some(placements) => {
                    let lines = self.to_lines(lines, frames, &placements, window_ms);
                    tracing::debug!(
                        strategy = %candidate,
                        lines = lines.len(),
                        frames = frames.len(),
                        "alignment pass done"
                    );
                    return Ok(Alignment {
                        lines,
                        strategy: candidate,
                        offset_ms,
                    });
                }
                None => log::debug!("[LineAligner] {} strategy unusable, falling back", candidate),
            }
        }

        log::info!(
            "[LineAligner] No usable audio analysis, spacing {} lines uniformly",
            lines.len()
        );
        let spacing = Duration::from_millis(u64::from(self.config.uniform_spacing_ms));
        let mut timed = uniform_timing(lines, spacing);
        enforce_ordering(&mut timed, self.tie_increment());
        Ok(Alignment {
            lines: timed,
            strategy: StrategyUsed::Uniform,
            offset_ms: None,
        })
    }

    fn to_lines<S: AsRef<str>>(
        &self,
        lines: &[S],
        frames: &[FeatureFrame],
        placements: &[LinePlacement],
        window_ms: u32,
    ) -> Vec<LyricLine> {
        let mut timed: Vec<LyricLine> = lines
            .iter()
            .zip(placements.iter())
            .map(|(text, placement)| {
                let secs = frames
                    .get(placement.frame_index)
                    .map(|f| f.timestamp_secs)
                    .unwrap_or(placement.frame_index as f64 * window_ms as f64 / 1000.0);
                LyricLine::new(
                    text.as_ref(),
                    duration_from_secs(secs),
                    placement.is_intense,
                )
            })
            .collect();
        enforce_ordering(&mut timed, self.tie_increment());
        timed
    }

    fn tie_increment(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.tie_increment_ms.max(1)))
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Sort by timestamp, then push every non-increasing timestamp to
/// `previous + increment`
///
/// The sort is stable so lines sharing a timestamp keep their text order.
pub fn enforce_ordering(lines: &mut [LyricLine], increment: Duration) {
    lines.sort_by_key(|line| line.timestamp);
    for i in 1..lines.len() {
        let previous = lines[i - 1].timestamp;
        if lines[i].timestamp <= previous {
            lines[i].timestamp = previous + increment;
        }
    }
}
