// Transport error types
//
// Errors raised by audio sources (file decoders, in-memory buffers). The
// feature extractor converts all of these into an empty frame sequence, so
// they only surface to callers that drive a source directly.

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log a transport error with structured context
pub fn log_transport_error(err: &TransportError, context: &str) {
    error!(
        "Transport error in {}: code={}, component=AudioSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio source errors
///
/// Error code range: 1001-1004
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The stream could not be opened (missing file, permissions, bad header)
    OpenFailed { path: String, reason: String },

    /// The stream uses a sample format the decoder does not handle
    UnsupportedFormat { details: String },

    /// Decoding failed part-way through the stream
    DecodeFailed { reason: String },

    /// Seeking to the requested position failed
    SeekFailed { seconds: f64, reason: String },
}

impl ErrorCode for TransportError {
    fn code(&self) -> i32 {
        match self {
            TransportError::OpenFailed { .. } => 1001,
            TransportError::UnsupportedFormat { .. } => 1002,
            TransportError::DecodeFailed { .. } => 1003,
            TransportError::SeekFailed { .. } => 1004,
        }
    }

    fn message(&self) -> String {
        match self {
            TransportError::OpenFailed { path, reason } => {
                format!("Failed to open audio stream {}: {}", path, reason)
            }
            TransportError::UnsupportedFormat { details } => {
                format!("Unsupported audio format: {}", details)
            }
            TransportError::DecodeFailed { reason } => {
                format!("Failed to decode audio: {}", reason)
            }
            TransportError::SeekFailed { seconds, reason } => {
                format!("Failed to seek to {:.3}s: {}", seconds, reason)
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransportError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for TransportError {}

impl From<hound::Error> for TransportError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::Unsupported => TransportError::UnsupportedFormat {
                details: "unsupported WAV feature".to_string(),
            },
            other => TransportError::DecodeFailed {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_codes() {
        assert_eq!(
            TransportError::OpenFailed {
                path: "x".to_string(),
                reason: "y".to_string()
            }
            .code(),
            1001
        );
        assert_eq!(
            TransportError::UnsupportedFormat {
                details: "24-bit float".to_string()
            }
            .code(),
            1002
        );
        assert_eq!(
            TransportError::DecodeFailed {
                reason: "eof".to_string()
            }
            .code(),
            1003
        );
        assert_eq!(
            TransportError::SeekFailed {
                seconds: 1.0,
                reason: "past end".to_string()
            }
            .code(),
            1004
        );
    }

    #[test]
    fn test_hound_unsupported_maps_to_format_error() {
        let err: TransportError = hound::Error::Unsupported.into();
        assert_eq!(err.code(), 1002);
    }
}
