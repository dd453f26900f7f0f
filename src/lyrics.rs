//! Lyric line values and the text-side helpers around alignment.
//!
//! Text acquisition happens elsewhere; these helpers only clean, regroup and
//! time lines that were handed in, and answer "which line is active now".

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One aligned lyric line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    pub text: String,
    #[serde(rename = "timestampMs", with = "duration_ms")]
    pub timestamp: Duration,
    /// High-energy line (shout, scream, chorus hit)
    pub is_intense: bool,
}

impl LyricLine {
    pub fn new(text: impl Into<String>, timestamp: Duration, is_intense: bool) -> Self {
        Self {
            text: text.into(),
            timestamp,
            is_intense,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Split raw text into trimmed, non-blank lines
pub fn clean_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Regroup lines into chunks of `words_per_chunk` words
///
/// Useful when the text source delivers a single paragraph or very uneven
/// lines; the player uses 6 words per chunk.
pub fn chunk_words<S: AsRef<str>>(lines: &[S], words_per_chunk: usize) -> Vec<String> {
    let words_per_chunk = words_per_chunk.max(1);
    let words: Vec<&str> = lines
        .iter()
        .flat_map(|line| line.as_ref().split_whitespace())
        .collect();
    words
        .chunks(words_per_chunk)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Evenly spaced timing used when no audio analysis is available
pub fn uniform_timing<S: AsRef<str>>(lines: &[S], spacing: Duration) -> Vec<LyricLine> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| LyricLine::new(line.as_ref(), spacing * i as u32, false))
        .collect()
}

/// Index of the line being sung at `position`
///
/// The active line is the last one whose `timestamp + offset_ms` is at or
/// before `position`. Returns `None` before the first line. `lines` must be
/// ordered by timestamp.
pub fn active_line_index(lines: &[LyricLine], position: Duration, offset_ms: f64) -> Option<usize> {
    let position_ms = position.as_secs_f64() * 1000.0;
    let count = lines.partition_point(|line| {
        line.timestamp.as_secs_f64() * 1000.0 + offset_ms <= position_ms
    });
    count.checked_sub(1)
}
