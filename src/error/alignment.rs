// Alignment pass error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log an alignment error with structured context
pub fn log_alignment_error(err: &AlignmentError, context: &str) {
    error!(
        "Alignment error in {}: code={}, component=LineAligner, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by an alignment pass
///
/// Unavailable inputs never show up here: they degrade to a coarser
/// strategy instead.
///
/// Error code range: 5001-5003
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// The pass was cancelled (usually superseded by a newer pass)
    Cancelled,

    /// A manager lock was poisoned
    LockPoisoned { component: String },

    /// The worker finished without delivering a result
    ChannelClosed,
}

impl ErrorCode for AlignmentError {
    fn code(&self) -> i32 {
        match self {
            AlignmentError::Cancelled => 5001,
            AlignmentError::LockPoisoned { .. } => 5002,
            AlignmentError::ChannelClosed => 5003,
        }
    }

    fn message(&self) -> String {
        match self {
            AlignmentError::Cancelled => "Alignment pass cancelled".to_string(),
            AlignmentError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
            AlignmentError::ChannelClosed => {
                "Alignment worker exited without a result".to_string()
            }
        }
    }
}

impl fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlignmentError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AlignmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_error_codes() {
        assert_eq!(AlignmentError::Cancelled.code(), 5001);
        assert_eq!(
            AlignmentError::LockPoisoned {
                component: "passes".to_string()
            }
            .code(),
            5002
        );
        assert_eq!(AlignmentError::ChannelClosed.code(), 5003);
    }
}
