// Resync loop error types

use crate::error::ErrorCode;
use std::fmt;

/// Errors raised when driving the resync loop
///
/// Error code range: 6001-6002
#[derive(Debug, Clone, PartialEq)]
pub enum ResyncError {
    /// No Tokio runtime is available to host the loop
    NoRuntime,

    /// The loop state lock was poisoned
    LockPoisoned,
}

impl ErrorCode for ResyncError {
    fn code(&self) -> i32 {
        match self {
            ResyncError::NoRuntime => 6001,
            ResyncError::LockPoisoned => 6002,
        }
    }

    fn message(&self) -> String {
        match self {
            ResyncError::NoRuntime => {
                "Resync loop requires a running Tokio runtime".to_string()
            }
            ResyncError::LockPoisoned => "Resync state lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for ResyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResyncError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ResyncError {}
