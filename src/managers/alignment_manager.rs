// AlignmentManager: Focused manager for background alignment passes
//
// Single Responsibility: at most one alignment pass per track
// Each pass runs on its own worker thread; starting a new pass for a track
// cancels the one already in flight for that track.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tokio::sync::oneshot;

use crate::align::Alignment;
use crate::cancel::CancelToken;
use crate::error::{log_alignment_error, AlignmentError};

/// Work executed by a pass; receives the pass's cancel token
pub type AlignmentJob =
    Box<dyn FnOnce(&CancelToken) -> Result<Alignment, AlignmentError> + Send + 'static>;

type PassResult = Result<Alignment, AlignmentError>;

/// Caller side of one running pass
pub struct AlignmentHandle {
    track_id: String,
    pass_id: u64,
    cancel: CancelToken,
    result_rx: oneshot::Receiver<PassResult>,
}

impl AlignmentHandle {
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn pass_id(&self) -> u64 {
        self.pass_id
    }

    /// Request cancellation; the worker stops at its next check
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block the current thread until the pass finishes
    ///
    /// Must not be called from inside an async task; use [`Self::result`]
    /// there.
    pub fn wait(self) -> PassResult {
        self.result_rx
            .blocking_recv()
            .map_err(|_| AlignmentError::ChannelClosed)?
    }

    /// Await the pass result
    pub async fn result(self) -> PassResult {
        self.result_rx
            .await
            .map_err(|_| AlignmentError::ChannelClosed)?
    }
}

struct ActivePass {
    pass_id: u64,
    cancel: CancelToken,
}

/// Runs alignment passes off the caller's thread
///
/// This manager handles:
/// - One worker thread per pass
/// - Cancelling the previous pass when a track is re-aligned
/// - Delivering the result through a oneshot channel
///
/// # Example
/// ```ignore
/// let manager = AlignmentManager::new();
/// let handle = manager.start_pass("track-1", Box::new(move |cancel| {
///     aligner.align(&lines, &analysis, AlignmentStrategy::Auto, cancel)
/// }))?;
/// let alignment = handle.wait()?;
/// ```
#[derive(Default)]
pub struct AlignmentManager {
    passes: Arc<Mutex<HashMap<String, ActivePass>>>,
    next_pass_id: AtomicU64,
}

impl AlignmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass for `track_id`, cancelling any pass already running for it
    ///
    /// # Returns
    /// * `Ok(AlignmentHandle)` - Handle to wait on or cancel the new pass
    /// * `Err(AlignmentError::LockPoisoned)` - Pass registry lock poisoned
    pub fn start_pass(
        &self,
        track_id: impl Into<String>,
        job: AlignmentJob,
    ) -> Result<AlignmentHandle, AlignmentError> {
        let track_id = track_id.into();
        let pass_id = self.next_pass_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        let (result_tx, result_rx) = oneshot::channel();

        {
            let mut passes = self.lock_passes()?;
            let previous = passes.insert(
                track_id.clone(),
                ActivePass {
                    pass_id,
                    cancel: cancel.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.cancel.cancel();
                log::info!(
                    "[AlignmentManager] Pass {} for '{}' superseded by pass {}",
                    previous.pass_id,
                    track_id,
                    pass_id
                );
            }
        }

        let registry = Arc::clone(&self.passes);
        let worker_track = track_id.clone();
        let worker_cancel = cancel.clone();
        thread::spawn(move || {
            let result = if worker_cancel.is_cancelled() {
                Err(AlignmentError::Cancelled)
            } else {
                job(&worker_cancel)
            };

            if let Ok(mut passes) = registry.lock() {
                if passes.get(&worker_track).map(|p| p.pass_id) == Some(pass_id) {
                    passes.remove(&worker_track);
                }
            }

            match &result {
                Ok(alignment) => tracing::debug!(
                    track = %worker_track,
                    pass_id,
                    strategy = %alignment.strategy,
                    lines = alignment.lines.len(),
                    "alignment pass finished"
                ),
                Err(AlignmentError::Cancelled) => {
                    log::debug!("[AlignmentManager] Pass {} cancelled", pass_id)
                }
                Err(err) => log_alignment_error(err, "alignment_pass"),
            }
            // The handle may already be gone
            let _ = result_tx.send(result);
        });

        Ok(AlignmentHandle {
            track_id,
            pass_id,
            cancel,
            result_rx,
        })
    }

    /// Cancel the pass running for `track_id`
    ///
    /// # Returns
    /// `Ok(true)` if a pass was running.
    pub fn cancel_track(&self, track_id: &str) -> Result<bool, AlignmentError> {
        let mut passes = self.lock_passes()?;
        Ok(match passes.remove(track_id) {
            Some(pass) => {
                pass.cancel.cancel();
                true
            }
            None => false,
        })
    }

    /// Cancel every running pass
    pub fn cancel_all(&self) -> Result<(), AlignmentError> {
        let mut passes = self.lock_passes()?;
        for (_, pass) in passes.drain() {
            pass.cancel.cancel();
        }
        Ok(())
    }

    pub fn is_running(&self, track_id: &str) -> Result<bool, AlignmentError> {
        Ok(self.lock_passes()?.contains_key(track_id))
    }

    pub fn active_passes(&self) -> Result<usize, AlignmentError> {
        Ok(self.lock_passes()?.len())
    }

    fn lock_passes(&self) -> Result<MutexGuard<'_, HashMap<String, ActivePass>>, AlignmentError> {
        self.passes.lock().map_err(|_| {
            let err = AlignmentError::LockPoisoned {
                component: "alignment_passes".to_string(),
            };
            log_alignment_error(&err, "lock_passes");
            err
        })
    }
}
