//! Error types for cached records.

use thiserror::Error;

/// Errors that can occur while encoding or parsing a cached record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A key was not valid base64
    #[error("invalid base64 key: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A decoded key had the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },
}
