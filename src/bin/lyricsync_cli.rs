use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lyric_sync::align::dtw::offset_for_lines;
use lyric_sync::align::OffsetMethod;
use lyric_sync::lyrics::{chunk_words, clean_lines};
use lyric_sync::{AlignmentStrategy, AppConfig, CancelToken, FeatureFrame, SyncContext};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "lyricsync_cli",
    about = "Offline analysis, alignment and training harness for the lyric sync engine"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/lyric_sync.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override directory holding the model and training corpus
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract feature frames (and onset scores when trained) from a WAV file
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Align a lyrics text file against a WAV file
    Align {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        lyrics: PathBuf,
        #[arg(long, default_value = "auto")]
        strategy: AlignmentStrategy,
        /// Regroup the text into chunks of this many words first
        #[arg(long)]
        chunk_words: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Estimate the global DTW offset between lyrics and audio
    Offset {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        lyrics: PathBuf,
    },
    /// Add a training sample from the frame nearest a timestamp
    Label {
        #[arg(long)]
        input: PathBuf,
        /// Seconds from the start of the track
        #[arg(long)]
        at: f64,
        /// Record a negative example ("no line starts here")
        #[arg(long)]
        negative: bool,
    },
    /// Train the onset model on the stored corpus
    Train,
    /// Print live band frames from the default input device
    Visualize {
        #[arg(long, default_value_t = 100)]
        frames: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    let ctx = SyncContext::new(config);

    match cli.command {
        Commands::Analyze { input, output } => run_analyze(&ctx, &input, output),
        Commands::Align {
            input,
            lyrics,
            strategy,
            chunk_words,
            output,
        } => run_align(&ctx, &input, &lyrics, strategy, chunk_words, output),
        Commands::Offset { input, lyrics } => run_offset(&ctx, &input, &lyrics),
        Commands::Label {
            input,
            at,
            negative,
        } => run_label(&ctx, &input, at, !negative),
        Commands::Train => run_train(&ctx),
        Commands::Visualize { frames } => run_visualize(&ctx, frames),
    }
}

fn run_analyze(ctx: &SyncContext, input: &Path, output: Option<PathBuf>) -> Result<ExitCode> {
    let analysis = ctx
        .analyze(input, &CancelToken::new())
        .with_context(|| format!("analyzing {}", input.display()))?;
    if analysis.is_empty() {
        eprintln!("No audio frames could be read from {}", input.display());
        return Ok(ExitCode::from(2));
    }

    let payload = AnalysisPayload {
        window_ms: analysis.window_ms,
        duration_secs: analysis.duration_secs,
        frame_count: analysis.frames.len(),
        frames: &analysis.frames,
        probabilities: analysis.probabilities.as_deref(),
    };
    emit_json(&payload, output)?;
    Ok(ExitCode::from(0))
}

fn run_align(
    ctx: &SyncContext,
    input: &Path,
    lyrics: &Path,
    strategy: AlignmentStrategy,
    words_per_chunk: Option<usize>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut lines = read_lyrics(lyrics)?;
    if let Some(n) = words_per_chunk {
        lines = chunk_words(&lines, n);
    }

    let track_id = input.display().to_string();
    let handle = ctx.start_alignment(&track_id, input.to_path_buf(), lines, strategy)?;
    let alignment = handle.wait()?;
    log::info!(
        "[lyricsync_cli] {} lines aligned with the {} strategy",
        alignment.lines.len(),
        alignment.strategy
    );

    emit_json(&alignment, output)?;
    Ok(ExitCode::from(0))
}

fn run_offset(ctx: &SyncContext, input: &Path, lyrics: &Path) -> Result<ExitCode> {
    let lines = read_lyrics(lyrics)?;
    let cancel = CancelToken::new();
    let analysis = ctx
        .analyze(input, &cancel)
        .with_context(|| format!("analyzing {}", input.display()))?;

    let estimate = offset_for_lines(
        &analysis.energy(),
        &lines,
        analysis.window_ms,
        &ctx.config().alignment,
        &cancel,
    )?;
    let Some(estimate) = estimate else {
        eprintln!("Nothing to align: no audio frames or no lyric lines");
        return Ok(ExitCode::from(2));
    };

    let payload = OffsetPayload {
        offset_ms: estimate.offset_ms,
        method: estimate.method,
        matched: estimate.matched_count(),
        impulses: estimate.matched.len(),
    };
    emit_json(&payload, None)?;
    Ok(ExitCode::from(0))
}

fn run_label(ctx: &SyncContext, input: &Path, at: f64, positive: bool) -> Result<ExitCode> {
    let analysis = ctx
        .analyze(input, &CancelToken::new())
        .with_context(|| format!("analyzing {}", input.display()))?;
    match ctx.label(&analysis, at, positive)? {
        Some(sample) => {
            println!("{}", serde_json::to_string(&sample)?);
            Ok(ExitCode::from(0))
        }
        None => {
            eprintln!("No audio frames could be read from {}", input.display());
            Ok(ExitCode::from(2))
        }
    }
}

fn run_train(ctx: &SyncContext) -> Result<ExitCode> {
    let report = ctx.train(&CancelToken::new()).with_context(|| {
        format!(
            "training from {}",
            ctx.model_store().corpus_path().display()
        )
    })?;
    emit_json(&report, None)?;
    Ok(ExitCode::from(0))
}

#[cfg(not(target_os = "android"))]
fn run_visualize(ctx: &SyncContext, frame_limit: usize) -> Result<ExitCode> {
    use lyric_sync::audio::LiveCapture;
    use std::time::Duration;

    let (capture, mut receiver) = LiveCapture::start(&ctx.config().visualizer)?;
    eprintln!(
        "Capturing at {} Hz, {} channel(s)",
        capture.sample_rate(),
        capture.channels()
    );

    let mut printed = 0usize;
    let mut failure = None;
    while printed < frame_limit && failure.is_none() {
        receiver.drain(|frame| {
            if printed >= frame_limit || failure.is_some() {
                return;
            }
            match serde_json::to_string(&BandPayload {
                timestamp_secs: frame.timestamp_secs,
                bands: &frame.bands,
            }) {
                Ok(line) => println!("{line}"),
                Err(err) => failure = Some(err),
            }
            printed += 1;
        });
        std::thread::sleep(Duration::from_millis(10));
    }

    let dropped = receiver.dropped_frames();
    capture.stop();
    if let Some(err) = failure {
        return Err(err.into());
    }
    eprintln!("{printed} frames printed, {dropped} dropped");
    Ok(ExitCode::from(0))
}

#[cfg(target_os = "android")]
fn run_visualize(_ctx: &SyncContext, _frame_limit: usize) -> Result<ExitCode> {
    Err(anyhow!("live capture is not available on this platform"))
}

fn read_lyrics(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let lines = clean_lines(&raw);
    if lines.is_empty() {
        return Err(anyhow!("{} contains no lyric lines", path.display()));
    }
    Ok(lines)
}

fn emit_json<T: Serialize>(value: &T, output_path: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisPayload<'a> {
    window_ms: u32,
    duration_secs: f64,
    frame_count: usize,
    frames: &'a [FeatureFrame],
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<&'a [f64]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OffsetPayload {
    offset_ms: f64,
    method: OffsetMethod,
    matched: usize,
    impulses: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BandPayload<'a> {
    timestamp_secs: f64,
    bands: &'a [f64],
}
