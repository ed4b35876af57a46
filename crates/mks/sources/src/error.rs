use mks_storage::Platform;
use std::time::Duration;
use thiserror::Error;

/// Result type for source fetches.
pub type SourceResult<T> = Result<T, SourceError>;

/// Source fetch errors. Adapters never retry; these surface to the caller.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{platform} request failed: {message}")]
    Http { platform: Platform, message: String },

    #[error("{platform} returned {status}: {body}")]
    Status {
        platform: Platform,
        status: u16,
        body: String,
    },

    #[error("{platform} response could not be parsed: {message}")]
    Parse { platform: Platform, message: String },

    #[error("{platform} authentication failed: {message}")]
    Auth { platform: Platform, message: String },

    #[error("{platform} timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        platform: Platform,
        waiting_for: String,
        after: Duration,
    },

    #[error("{platform} browser error: {message}")]
    Browser { platform: Platform, message: String },
}

impl SourceError {
    pub fn platform(&self) -> Platform {
        match self {
            SourceError::Http { platform, .. }
            | SourceError::Status { platform, .. }
            | SourceError::Parse { platform, .. }
            | SourceError::Auth { platform, .. }
            | SourceError::Timeout { platform, .. }
            | SourceError::Browser { platform, .. } => *platform,
        }
    }
}
