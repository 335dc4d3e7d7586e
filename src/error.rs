//! Error taxonomy for platform calls.

use thiserror::Error;

/// Result type returned by every `PlatformClient` call.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Failure of a single platform call. None of these fault the whole pipeline
/// on their own; the caller decides whether to continue.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Credential rejected or expired (401/403)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any other non-success status
    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("could not decode response: {0}")]
    Decode(String),

    /// 404 from the platform
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        PlatformError::Decode(e.to_string())
    }
}

impl PlatformError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PlatformError::Auth(_))
    }
}
