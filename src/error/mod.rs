// Error types for the lyric synchronization engine
//
// This module defines typed error enums for every component that can fail,
// each carrying a stable numeric code so callers (CLI, UI glue) can branch on
// failures without string matching.
//
// Code ranges:
// - 1001-1004: transport (audio source) errors
// - 3001-3003: analysis errors
// - 4001-4007: onset model / training errors
// - 5001-5003: alignment pass errors
// - 6001-6002: resync loop errors

mod alignment;
mod analysis;
mod model;
mod resync;
mod transport;

pub use alignment::{log_alignment_error, AlignmentError};
pub use analysis::AnalysisError;
pub use model::{log_model_error, ModelError};
pub use resync::ResyncError;
pub use transport::{log_transport_error, TransportError};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the library boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_trait_objects() {
        let errors: Vec<Box<dyn ErrorCode>> = vec![
            Box::new(TransportError::OpenFailed {
                path: "a.wav".to_string(),
                reason: "missing".to_string(),
            }),
            Box::new(AnalysisError::InvalidFftLength { len: 3 }),
            Box::new(ModelError::NoTrainingData),
            Box::new(AlignmentError::Cancelled),
            Box::new(ResyncError::NoRuntime),
        ];

        let codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec![1001, 3001, 4001, 5001, 6001]);
        assert!(errors.iter().all(|e| !e.message().is_empty()));
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), ModelError> {
            Err(ModelError::NoTrainingData)
        }

        fn caller() -> Result<(), ModelError> {
            may_fail()?;
            Ok(())
        }

        assert_eq!(caller(), Err(ModelError::NoTrainingData));
    }
}
