//! Cooperative cancellation shared between a controller and a worker.
//!
//! Workers poll [`CancelToken::is_cancelled`] at loop-iteration granularity;
//! cancelling is idempotent and never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let worker_view = token.clone();
        assert!(!worker_view.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(worker_view.is_cancelled());
    }
}
