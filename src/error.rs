//! Failure taxonomy shared by the HTTP collaborators.
//!
//! None of these ever reach the status snapshot: the resolver and the tracker
//! turn every variant into "no data" or a placeholder.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, refused connections and similar. Retried by [`crate::retry::RetryPolicy`].
    #[error("network error: {0}")]
    NetworkTransient(String),

    #[error("not found")]
    NotFound,

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("authorization expired")]
    AuthExpired,

    #[error("unexpected http status {0}")]
    Status(u16),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::NetworkTransient(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::MalformedData(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::NetworkTransient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::MalformedData(err.to_string())
    }
}
