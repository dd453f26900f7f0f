//! End-to-end alignment of a synthetic track without a trained model
//!
//! The track is 30 seconds of silence with two loud bursts at 5s and 20s.
//! With no model present the engine must fall back to the energy strategy,
//! which should put the lines into the two bursts.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Duration;

use lyric_sync::analysis::analyze_source;
use lyric_sync::audio::MemorySource;
use lyric_sync::config::StorageConfig;
use lyric_sync::{
    AlignmentStrategy, AppConfig, CancelToken, LineAligner, LyricLine, StrategyUsed, SyncContext,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SAMPLE_RATE: u32 = 8000;
const TRACK_SECS: f64 = 30.0;
const BURSTS: [f64; 2] = [5.0, 20.0];
const BURST_SECS: f64 = 0.5;

fn burst_track() -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(7);
    let total = (TRACK_SECS * SAMPLE_RATE as f64) as usize;
    (0..total)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let in_burst = BURSTS.iter().any(|&b| t >= b && t < b + BURST_SECS);
            // Noisy tone inside the bursts, digital silence elsewhere
            let sample = if in_burst {
                0.6 * (2.0 * PI * 440.0 * t).sin() + rng.gen_range(-0.2..0.2)
            } else {
                0.0
            };
            sample as f32
        })
        .collect()
}

fn ten_lines() -> Vec<String> {
    (1..=10).map(|i| format!("line number {:02}", i)).collect()
}

fn assert_burst_alignment(lines: &[LyricLine]) {
    assert_eq!(lines.len(), 10);

    for pair in lines.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp, "not strictly increasing");
    }

    let mut near = [0usize; 2];
    for line in lines {
        let secs = line.timestamp.as_secs_f64();
        assert!(secs <= TRACK_SECS, "{} beyond track end", secs);
        let burst = BURSTS
            .iter()
            .position(|&b| (secs - b).abs() <= 1.0)
            .unwrap_or_else(|| panic!("line at {:.2}s is not near a burst", secs));
        near[burst] += 1;
    }

    assert!(near[0] >= 4 && near[1] >= 4, "lines per burst: {:?}", near);
}

#[test]
fn test_energy_strategy_lands_lines_in_bursts() {
    let config = AppConfig::default();
    let mut source = MemorySource::mono(burst_track(), SAMPLE_RATE);
    let analysis = analyze_source(&mut source, &config.analysis, None, &CancelToken::new())
        .expect("analysis of an in-memory track");
    assert!(analysis.probabilities.is_none());
    assert_eq!(analysis.frames.len(), 600);

    let alignment = LineAligner::new(config.alignment)
        .align(
            &ten_lines(),
            &analysis,
            AlignmentStrategy::Auto,
            &CancelToken::new(),
        )
        .expect("alignment pass");

    assert_eq!(alignment.strategy, StrategyUsed::Energy);
    assert_burst_alignment(&alignment.lines);
}

#[test]
fn test_wav_file_alignment_through_context() {
    let dir = std::env::temp_dir().join(format!("lyric_sync_burst_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir");
    let wav_path: PathBuf = dir.join("bursts.wav");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&wav_path, spec).expect("create wav");
    for sample in burst_track() {
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");

    let config = AppConfig {
        storage: StorageConfig {
            data_dir: dir.join("data"),
            ..StorageConfig::default()
        },
        ..AppConfig::default()
    };
    let ctx = SyncContext::new(config);
    let handle = ctx
        .start_alignment("bursts", wav_path, ten_lines(), AlignmentStrategy::Auto)
        .expect("start pass");
    let alignment = handle.wait().expect("pass result");

    assert_eq!(alignment.strategy, StrategyUsed::Energy);
    assert_burst_alignment(&alignment.lines);

    // Highlighting follows the aligned timestamps
    let first = alignment.lines[0].timestamp;
    assert_eq!(ctx.active_line(&alignment.lines, first), Some(0));
    assert_eq!(
        ctx.active_line(&alignment.lines, first - Duration::from_millis(1)),
        None
    );

    let _ = std::fs::remove_dir_all(&dir);
}
