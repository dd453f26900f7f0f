// SyncContext: Dependency Injection Container
// Wires configuration, the model store, alignment passes and the resync loop

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::align::{Alignment, AlignmentStrategy, LineAligner};
use crate::analysis::onset::{label_frame, OnsetModel, TrainingReport, TrainingSample};
use crate::analysis::{analyze_path, TrackAnalysis};
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::error::{log_model_error, AlignmentError, AnalysisError, ModelError, ResyncError};
use crate::lyrics::{active_line_index, LyricLine};
use crate::managers::{AlignmentHandle, AlignmentManager};
use crate::resync::{DtwOffsetEstimator, PlaybackEvent, ResyncLoop, ResyncState};
use crate::storage::ModelStore;

/// SyncContext: one playback session's view of the sync engine
///
/// Holds everything that outlives a single call:
/// - The configuration snapshot
/// - The model store (lazy model cache, training corpus)
/// - Per-track alignment passes
/// - The resync loop and its smoothed offset
///
/// All methods take `&self`; the context can be shared behind an `Arc`.
pub struct SyncContext {
    config: AppConfig,
    store: Arc<ModelStore>,
    aligner: LineAligner,
    passes: AlignmentManager,
    resync: ResyncLoop,
}

impl SyncContext {
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(ModelStore::new(&config.storage));
        let aligner = LineAligner::new(config.alignment.clone());
        let resync = ResyncLoop::new(&config.resync);
        Self {
            config,
            store,
            aligner,
            passes: AlignmentManager::new(),
            resync,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model_store(&self) -> &ModelStore {
        &self.store
    }

    /// The cached model, or `None` when untrained or unreadable
    pub fn model(&self) -> Option<Arc<OnsetModel>> {
        current_model(&self.store)
    }

    // ========================================================================
    // ANALYSIS AND ALIGNMENT
    // ========================================================================

    /// Analyze a WAV file, scoring frames when a model is available
    pub fn analyze(&self, path: &Path, cancel: &CancelToken) -> Result<TrackAnalysis, AnalysisError> {
        let model = self.model();
        analyze_path(path, &self.config.analysis, model.as_deref(), cancel)
    }

    /// Align lines against an existing analysis on the calling thread
    pub fn align_analysis<S: AsRef<str>>(
        &self,
        lines: &[S],
        analysis: &TrackAnalysis,
        strategy: AlignmentStrategy,
        cancel: &CancelToken,
    ) -> Result<Alignment, AlignmentError> {
        self.aligner.align(lines, analysis, strategy, cancel)
    }

    /// Analyze and align a track in the background
    ///
    /// A pass already running for `track_id` is cancelled first.
    pub fn start_alignment(
        &self,
        track_id: &str,
        path: PathBuf,
        lines: Vec<String>,
        strategy: AlignmentStrategy,
    ) -> Result<AlignmentHandle, AlignmentError> {
        let store = Arc::clone(&self.store);
        let analysis_config = self.config.analysis.clone();
        let aligner = self.aligner.clone();

        self.passes.start_pass(
            track_id,
            Box::new(move |cancel: &CancelToken| {
                let model = current_model(&store);
                let analysis = analyze_path(&path, &analysis_config, model.as_deref(), cancel)
                    .map_err(|_| AlignmentError::Cancelled)?;
                aligner.align(&lines, &analysis, strategy, cancel)
            }),
        )
    }

    pub fn cancel_alignment(&self, track_id: &str) -> Result<bool, AlignmentError> {
        self.passes.cancel_track(track_id)
    }

    // ========================================================================
    // TRAINING
    // ========================================================================

    /// Record "a line starts here" (or not) at `timestamp_secs`
    ///
    /// # Returns
    /// The stored sample, or `None` when the analysis has no frames.
    pub fn label(
        &self,
        analysis: &TrackAnalysis,
        timestamp_secs: f64,
        label: bool,
    ) -> Result<Option<TrainingSample>, ModelError> {
        match label_frame(&analysis.frames, timestamp_secs, label) {
            Some(sample) => {
                self.store.add_sample(&sample)?;
                Ok(Some(sample))
            }
            None => Ok(None),
        }
    }

    /// Train on the stored corpus and replace the model
    pub fn train(&self, cancel: &CancelToken) -> Result<TrainingReport, ModelError> {
        self.store.train_from_corpus(&self.config.training, cancel)
    }

    // ========================================================================
    // PLAYBACK AND RESYNC
    // ========================================================================

    /// Feed a player transition to the resync loop
    pub fn on_playback(&self, event: PlaybackEvent) -> Result<ResyncState, ResyncError> {
        self.resync.handle_event(event)
    }

    /// Start resync for a playing track; requires a Tokio runtime
    ///
    /// An empty line set leaves the loop idle.
    pub fn start_resync<S: AsRef<str>>(
        &self,
        analysis: &TrackAnalysis,
        lines: &[S],
    ) -> Result<ResyncState, ResyncError> {
        let estimator = DtwOffsetEstimator::new(analysis, lines, self.config.alignment.clone());
        self.on_playback(PlaybackEvent::Started {
            estimator: Arc::new(estimator),
        })
    }

    pub fn offset_ms(&self) -> f64 {
        self.resync.offset_ms()
    }

    /// Line to highlight at `position`, corrected by the resync offset
    pub fn active_line(&self, lines: &[LyricLine], position: Duration) -> Option<usize> {
        active_line_index(lines, position, self.offset_ms())
    }

    /// Cancel background work: alignment passes and the resync loop
    pub fn shutdown(&self) {
        if let Err(err) = self.passes.cancel_all() {
            log::warn!("[SyncContext] Cancelling passes failed: {}", err);
        }
        if let Err(err) = self.resync.stop() {
            log::warn!("[SyncContext] Stopping resync failed: {}", err);
        }
    }
}

fn current_model(store: &ModelStore) -> Option<Arc<OnsetModel>> {
    match store.model() {
        Ok(model) => model,
        Err(err) => {
            log_model_error(&err, "current_model");
            None
        }
    }
}
