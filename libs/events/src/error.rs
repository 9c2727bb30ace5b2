//! Error types for event decoding.

use thiserror::Error;

/// Errors that can occur when decoding a webhook event.
#[derive(Debug, Error)]
pub enum EventError {
    /// The body is not a JSON document of the expected shape.
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl EventError {
    /// Returns true if the input ended before a complete document was read.
    pub fn is_eof(&self) -> bool {
        match self {
            EventError::Malformed(err) => err.is_eof(),
        }
    }
}
