// Lyric Sync Core - Rust audio analysis and lyric alignment engine
// Offline feature/onset pipeline, line alignment and a lock-free live visualizer

// Module declarations
pub mod align;
pub mod analysis;
pub mod audio;
pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod lyrics;
pub mod managers;
pub mod resync;
pub mod storage;
pub mod visualizer;

// Re-exports for convenience
pub use align::{Alignment, AlignmentStrategy, LineAligner, StrategyUsed};
pub use analysis::features::{FeatureExtractor, FeatureFrame, FeatureVector};
pub use analysis::onset::{OnsetModel, TrainingReport, TrainingSample};
pub use analysis::TrackAnalysis;
pub use cancel::CancelToken;
pub use config::AppConfig;
pub use context::SyncContext;
pub use lyrics::LyricLine;
pub use resync::{PlaybackEvent, ResyncLoop, SmoothedOffset};
pub use visualizer::{BandFrame, Visualizer};
