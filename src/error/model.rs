// Onset model error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log a model error with structured context
///
/// `NoTrainingData` is an expected bootstrap state and is logged at warn
/// level so that "no data" and genuine failures stay distinguishable.
pub fn log_model_error(err: &ModelError, context: &str) {
    match err {
        ModelError::NoTrainingData => log::warn!(
            "Model warning in {}: code={}, component=OnsetModel, message={}",
            context,
            err.code(),
            err.message()
        ),
        _ => error!(
            "Model error in {}: code={}, component=OnsetModel, message={}",
            context,
            err.code(),
            err.message()
        ),
    }
}

/// Training, inference and persistence errors for the onset model
///
/// Error code range: 4001-4007
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The training corpus is empty
    NoTrainingData,

    /// A corpus sample has a different feature length than the first sample
    InconsistentDimensions {
        expected: usize,
        found: usize,
        index: usize,
    },

    /// Training parameters are unusable (zero hidden units, non-finite rate)
    InvalidParameters { reason: String },

    /// Reading or writing the model/corpus file failed
    Io { details: String },

    /// The model or corpus could not be (de)serialized
    Serialization { details: String },

    /// The cached model lock was poisoned
    LockPoisoned,

    /// Training was cancelled before completion
    Cancelled,
}

impl ErrorCode for ModelError {
    fn code(&self) -> i32 {
        match self {
            ModelError::NoTrainingData => 4001,
            ModelError::InconsistentDimensions { .. } => 4002,
            ModelError::InvalidParameters { .. } => 4003,
            ModelError::Io { .. } => 4004,
            ModelError::Serialization { .. } => 4005,
            ModelError::LockPoisoned => 4006,
            ModelError::Cancelled => 4007,
        }
    }

    fn message(&self) -> String {
        match self {
            ModelError::NoTrainingData => "No training data available".to_string(),
            ModelError::InconsistentDimensions {
                expected,
                found,
                index,
            } => format!(
                "Sample {} has {} features, expected {}",
                index, found, expected
            ),
            ModelError::InvalidParameters { reason } => {
                format!("Invalid training parameters: {}", reason)
            }
            ModelError::Io { details } => format!("Model storage I/O failed: {}", details),
            ModelError::Serialization { details } => {
                format!("Model serialization failed: {}", details)
            }
            ModelError::LockPoisoned => "Model cache lock poisoned".to_string(),
            ModelError::Cancelled => "Training cancelled".to_string(),
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModelError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ModelError {}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Io {
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_codes() {
        assert_eq!(ModelError::NoTrainingData.code(), 4001);
        assert_eq!(
            ModelError::InconsistentDimensions {
                expected: 4,
                found: 3,
                index: 7
            }
            .code(),
            4002
        );
        assert_eq!(
            ModelError::InvalidParameters {
                reason: "x".to_string()
            }
            .code(),
            4003
        );
        assert_eq!(
            ModelError::Io {
                details: "x".to_string()
            }
            .code(),
            4004
        );
        assert_eq!(
            ModelError::Serialization {
                details: "x".to_string()
            }
            .code(),
            4005
        );
        assert_eq!(ModelError::LockPoisoned.code(), 4006);
        assert_eq!(ModelError::Cancelled.code(), 4007);
    }

    #[test]
    fn test_inconsistent_dimensions_message() {
        let err = ModelError::InconsistentDimensions {
            expected: 4,
            found: 3,
            index: 7,
        };
        assert!(err.message().contains("Sample 7"));
        assert!(err.message().contains("expected 4"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: ModelError = io_err.into();
        match err {
            ModelError::Io { details } => assert!(details.contains("read-only")),
            other => panic!("Expected Io variant, got {:?}", other),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<f64>>("not json").unwrap_err();
        let err: ModelError = json_err.into();
        assert_eq!(err.code(), 4005);
    }
}
