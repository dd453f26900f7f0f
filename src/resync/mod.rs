// Resync loop - periodic offset re-estimation while a track plays
//
// State machine: Idle -> Running -> Idle
//
// While running, a Tokio task wakes every `interval_ms`, runs the offset
// estimator on the blocking pool and folds the result into a shared smoothed
// offset:
//
//     smoothed = smoothed * alpha + estimate * (1 - alpha)
//
// The UI thread reads the offset on every progress tick through
// `SmoothedOffset::get`, which is a single atomic load.
//
// Stopping is immediate: the task waits on a watch channel alongside both the
// timer and the in-flight estimate, and the estimator itself polls the cancel
// token between DTW rows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::align::dtw::offset_for_lines;
use crate::analysis::TrackAnalysis;
use crate::cancel::CancelToken;
use crate::config::{AlignmentConfig, ResyncConfig};
use crate::error::{AlignmentError, ResyncError};

/// Exponentially smoothed offset in milliseconds, shared across threads
///
/// Stored as the bit pattern of an `f64` so reads and read-modify-write
/// updates need no lock.
#[derive(Debug)]
pub struct SmoothedOffset {
    bits: AtomicU64,
    alpha: f64,
}

impl SmoothedOffset {
    /// `alpha` is the weight kept from the previous value, clamped to [0, 1]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            bits: AtomicU64::new(0.0_f64.to_bits()),
            alpha,
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Fold a new estimate in and return the updated value
    ///
    /// Non-finite estimates are ignored.
    pub fn update(&self, estimate_ms: f64) -> f64 {
        if !estimate_ms.is_finite() {
            return self.get();
        }
        let alpha = self.alpha;
        let blend = |bits: u64| {
            let current = f64::from_bits(bits);
            Some((current * alpha + estimate_ms * (1.0 - alpha)).to_bits())
        };
        // The closure always returns Some, so both arms carry the previous bits
        let previous = match self.bits.fetch_update(Ordering::AcqRel, Ordering::Acquire, blend) {
            Ok(bits) | Err(bits) => bits,
        };
        let current = f64::from_bits(previous);
        current * alpha + estimate_ms * (1.0 - alpha)
    }

    pub fn reset(&self) {
        self.bits.store(0.0_f64.to_bits(), Ordering::Release);
    }
}

/// Source of raw offset estimates for the loop
pub trait OffsetEstimator: Send + Sync {
    /// Current offset in milliseconds, or `None` when nothing can be estimated
    fn estimate(&self, cancel: &CancelToken) -> Result<Option<f64>, AlignmentError>;

    /// Whether there is a lyric line set to estimate against
    fn has_lines(&self) -> bool {
        true
    }
}

/// DTW offset of the current track's lines against its energy sequence
#[derive(Debug, Clone)]
pub struct DtwOffsetEstimator {
    energy: Vec<f64>,
    lines: Vec<String>,
    window_ms: u32,
    config: AlignmentConfig,
}

impl DtwOffsetEstimator {
    pub fn new<S: AsRef<str>>(
        analysis: &TrackAnalysis,
        lines: &[S],
        config: AlignmentConfig,
    ) -> Self {
        Self {
            energy: analysis.energy(),
            lines: lines.iter().map(|l| l.as_ref().to_string()).collect(),
            window_ms: analysis.window_ms,
            config,
        }
    }
}

impl OffsetEstimator for DtwOffsetEstimator {
    fn estimate(&self, cancel: &CancelToken) -> Result<Option<f64>, AlignmentError> {
        let estimate =
            offset_for_lines(&self.energy, &self.lines, self.window_ms, &self.config, cancel)?;
        Ok(estimate.map(|e| e.offset_ms))
    }

    fn has_lines(&self) -> bool {
        !self.lines.is_empty()
    }
}

/// Player transitions that drive the loop
#[derive(Clone)]
pub enum PlaybackEvent {
    /// Playback started with a line set present
    Started { estimator: Arc<dyn OffsetEstimator> },
    Paused,
    Stopped,
    TrackEnded,
    /// A new track was loaded; the offset starts over from zero
    TrackChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncState {
    Idle,
    Running,
}

struct RunningLoop {
    cancel: CancelToken,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningLoop {
    fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.stop_tx.send(true);
        drop(self.task);
    }
}

/// Periodic offset re-estimation
pub struct ResyncLoop {
    interval: Duration,
    offset: Arc<SmoothedOffset>,
    running: Mutex<Option<RunningLoop>>,
}

impl ResyncLoop {
    pub fn new(config: &ResyncConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            offset: Arc::new(SmoothedOffset::new(config.smoothing_alpha)),
            running: Mutex::new(None),
        }
    }

    /// Current smoothed offset in milliseconds
    pub fn offset_ms(&self) -> f64 {
        self.offset.get()
    }

    /// Shared handle for readers on other threads
    pub fn offset_handle(&self) -> Arc<SmoothedOffset> {
        Arc::clone(&self.offset)
    }

    pub fn state(&self) -> Result<ResyncState, ResyncError> {
        let guard = self.lock()?;
        Ok(match guard.as_ref() {
            Some(running) if !running.task.is_finished() => ResyncState::Running,
            _ => ResyncState::Idle,
        })
    }

    /// Apply a playback transition
    pub fn handle_event(&self, event: PlaybackEvent) -> Result<ResyncState, ResyncError> {
        match event {
            PlaybackEvent::Started { estimator } => self.start(estimator)?,
            PlaybackEvent::Paused | PlaybackEvent::Stopped | PlaybackEvent::TrackEnded => {
                self.stop()?
            }
            PlaybackEvent::TrackChanged => {
                self.stop()?;
                self.offset.reset();
            }
        }
        self.state()
    }

    /// Start the loop, replacing any loop already running
    ///
    /// Without a line set the previous loop is stopped and the loop stays
    /// idle. Must be called from within a Tokio runtime.
    pub fn start(&self, estimator: Arc<dyn OffsetEstimator>) -> Result<(), ResyncError> {
        let handle = Handle::try_current().map_err(|_| ResyncError::NoRuntime)?;
        let mut guard = self.lock()?;
        if let Some(previous) = guard.take() {
            previous.shutdown();
        }
        if !estimator.has_lines() {
            log::info!("[ResyncLoop] No lyric lines, staying idle");
            return Ok(());
        }

        let cancel = CancelToken::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = handle.spawn(run_loop(
            self.interval,
            estimator,
            Arc::clone(&self.offset),
            cancel.clone(),
            stop_rx,
        ));

        log::info!("[ResyncLoop] Started ({} ms interval)", self.interval.as_millis());
        *guard = Some(RunningLoop {
            cancel,
            stop_tx,
            task,
        });
        Ok(())
    }

    /// Stop the loop; a no-op when idle
    pub fn stop(&self) -> Result<(), ResyncError> {
        if let Some(running) = self.lock()?.take() {
            running.shutdown();
            log::info!("[ResyncLoop] Stopped");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<RunningLoop>>, ResyncError> {
        self.running.lock().map_err(|_| ResyncError::LockPoisoned)
    }
}

impl Drop for ResyncLoop {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.running.lock() {
            if let Some(running) = guard.take() {
                running.shutdown();
            }
        }
    }
}

async fn run_loop(
    period: Duration,
    estimator: Arc<dyn OffsetEstimator>,
    offset: Arc<SmoothedOffset>,
    cancel: CancelToken,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; estimates start one period in
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        let worker_estimator = Arc::clone(&estimator);
        let worker_cancel = cancel.clone();
        let job = tokio::task::spawn_blocking(move || worker_estimator.estimate(&worker_cancel));

        let result = tokio::select! {
            _ = stop_rx.changed() => break,
            result = job => result,
        };

        match result {
            Ok(Ok(Some(estimate))) if !cancel.is_cancelled() => {
                let smoothed = offset.update(estimate);
                tracing::trace!(estimate, smoothed, "resync tick");
            }
            Ok(Ok(_)) => {}
            Ok(Err(AlignmentError::Cancelled)) => break,
            Ok(Err(err)) => log::warn!("[ResyncLoop] Estimate failed: {}", err),
            Err(err) => log::warn!("[ResyncLoop] Estimator task failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FixedEstimator {
        value: f64,
        calls: AtomicUsize,
    }

    impl FixedEstimator {
        fn new(value: f64) -> Arc<Self> {
            Arc::new(Self {
                value,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl OffsetEstimator for FixedEstimator {
        fn estimate(&self, _cancel: &CancelToken) -> Result<Option<f64>, AlignmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.value))
        }
    }

    fn fast_config() -> ResyncConfig {
        ResyncConfig {
            interval_ms: 10,
            smoothing_alpha: 0.85,
        }
    }

    #[test]
    fn test_smoothing_formula() {
        let offset = SmoothedOffset::new(0.85);
        let first = offset.update(100.0);
        assert!((first - 15.0).abs() < 1e-9);
        let second = offset.update(100.0);
        assert!((second - 27.75).abs() < 1e-9);
        assert!((offset.get() - 27.75).abs() < 1e-9);

        offset.update(f64::NAN);
        assert!((offset.get() - 27.75).abs() < 1e-9);

        offset.reset();
        assert_eq!(offset.get(), 0.0);
    }

    #[test]
    fn test_start_requires_runtime() {
        let resync = ResyncLoop::new(&fast_config());
        let result = resync.start(FixedEstimator::new(1.0));
        assert_eq!(result, Err(ResyncError::NoRuntime));
        assert_eq!(resync.state().unwrap(), ResyncState::Idle);
    }

    #[tokio::test]
    async fn test_loop_converges_towards_estimate() {
        let resync = ResyncLoop::new(&fast_config());
        let estimator = FixedEstimator::new(200.0);
        resync.start(estimator.clone()).unwrap();
        assert_eq!(resync.state().unwrap(), ResyncState::Running);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let offset = resync.offset_ms();
        assert!(offset > 0.0 && offset < 200.0, "offset {}", offset);
        assert!(estimator.calls.load(Ordering::SeqCst) >= 1);

        resync.stop().unwrap();
    }

    #[tokio::test]
    async fn test_stop_freezes_offset() {
        let resync = ResyncLoop::new(&fast_config());
        resync.start(FixedEstimator::new(50.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        resync.stop().unwrap();
        resync.stop().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frozen = resync.offset_ms();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(resync.offset_ms(), frozen);
        assert_eq!(resync.state().unwrap(), ResyncState::Idle);
    }

    #[tokio::test]
    async fn test_restart_replaces_previous_loop() {
        let resync = ResyncLoop::new(&fast_config());
        let first = FixedEstimator::new(10.0);
        let second = FixedEstimator::new(20.0);

        resync.start(first.clone()).unwrap();
        resync.start(second.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first_calls = first.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(first.calls.load(Ordering::SeqCst), first_calls);
        assert!(second.calls.load(Ordering::SeqCst) >= 1);
        resync.stop().unwrap();
    }

    #[tokio::test]
    async fn test_track_change_resets_offset() {
        let resync = ResyncLoop::new(&fast_config());
        let state = resync
            .handle_event(PlaybackEvent::Started {
                estimator: FixedEstimator::new(100.0),
            })
            .unwrap();
        assert_eq!(state, ResyncState::Running);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(resync.offset_ms() > 0.0);

        let state = resync.handle_event(PlaybackEvent::TrackChanged).unwrap();
        assert_eq!(state, ResyncState::Idle);
        assert_eq!(resync.offset_ms(), 0.0);

        let state = resync.handle_event(PlaybackEvent::Paused).unwrap();
        assert_eq!(state, ResyncState::Idle);
    }

    #[tokio::test]
    async fn test_start_without_lines_stays_idle() {
        let resync = ResyncLoop::new(&fast_config());
        let running = FixedEstimator::new(30.0);
        resync.start(running.clone()).unwrap();
        assert_eq!(resync.state().unwrap(), ResyncState::Running);

        let analysis = TrackAnalysis::from_frames(Vec::new(), 50, None);
        let no_lines: [&str; 0] = [];
        let empty = DtwOffsetEstimator::new(&analysis, &no_lines, AlignmentConfig::default());
        assert!(!empty.has_lines());

        let state = resync
            .handle_event(PlaybackEvent::Started {
                estimator: Arc::new(empty),
            })
            .unwrap();
        assert_eq!(state, ResyncState::Idle);

        // The loop for the previous line set is gone too
        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = running.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(running.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_dtw_estimator_reports_offset() {
        use crate::analysis::features::{FeatureFrame, FeatureVector};

        // Two lines, impulses at 50 and 100; audio bursts 4 frames late
        let mut rms = vec![0.01; 101];
        rms[54] = 0.9;
        let frames = rms
            .iter()
            .enumerate()
            .map(|(i, &r)| FeatureFrame {
                timestamp_secs: i as f64 * 0.05,
                features: FeatureVector {
                    rms: r,
                    ..FeatureVector::default()
                },
            })
            .collect();
        let analysis = TrackAnalysis::from_frames(frames, 50, None);
        let estimator = DtwOffsetEstimator::new(&analysis, &["ab", "ab"], AlignmentConfig::default());

        let offset = estimator.estimate(&CancelToken::new()).unwrap().unwrap();
        assert_eq!(offset, 200.0);
    }
}
