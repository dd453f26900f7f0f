// Analysis error types

use crate::error::{ErrorCode, TransportError};
use std::fmt;

/// Errors raised by the DSP primitives
///
/// Error code range: 3001-3003
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// FFT buffer length is not a power of two (caller must zero-pad)
    InvalidFftLength { len: usize },

    /// A long-running analysis was cancelled
    Cancelled,

    /// The audio source failed mid-stream
    SourceFailed { reason: String },
}

impl ErrorCode for AnalysisError {
    fn code(&self) -> i32 {
        match self {
            AnalysisError::InvalidFftLength { .. } => 3001,
            AnalysisError::Cancelled => 3002,
            AnalysisError::SourceFailed { .. } => 3003,
        }
    }

    fn message(&self) -> String {
        match self {
            AnalysisError::InvalidFftLength { len } => {
                format!("FFT length must be a power of two (got {})", len)
            }
            AnalysisError::Cancelled => "Analysis cancelled".to_string(),
            AnalysisError::SourceFailed { reason } => {
                format!("Audio source failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnalysisError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AnalysisError {}

impl From<TransportError> for AnalysisError {
    fn from(err: TransportError) -> Self {
        AnalysisError::SourceFailed {
            reason: err.message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_length_message() {
        let err = AnalysisError::InvalidFftLength { len: 100 };
        assert_eq!(err.code(), 3001);
        assert!(err.message().contains("100"));
        assert!(err.to_string().contains("code 3001"));
    }

    #[test]
    fn test_transport_failure_converts() {
        let err: AnalysisError = TransportError::DecodeFailed {
            reason: "truncated".to_string(),
        }
        .into();
        assert_eq!(err.code(), 3003);
        assert!(err.message().contains("truncated"));
    }
}
