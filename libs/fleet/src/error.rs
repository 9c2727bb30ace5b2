use thiserror::Error;

/// Errors returned by a fleet backend.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The backend answered with a non-success status.
    #[error("fleet backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The request never produced a response (connect, timeout, decode).
    #[error("fleet backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered successfully but the body is missing something.
    #[error("unexpected fleet backend response: {0}")]
    InvalidResponse(String),

    /// The backend is unavailable.
    #[error("fleet backend unavailable: {0}")]
    Unavailable(String),
}
