//! Error types for the swarm daemon

use mks_model_openai::ModelError;
use mks_sources::SourceError;
use mks_storage::{Platform, StorageError};
use thiserror::Error;

/// Daemon errors. Nothing here is recovered locally; every variant ends the
/// current cycle and, from the scheduler, the process.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Missing credential or invalid configuration, detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A source fetch failed under the abort policy
    #[error("Source {platform} failed: {source}")]
    Source {
        platform: Platform,
        #[source]
        source: SourceError,
    },

    #[error("Generation failed: {0}")]
    Generation(#[from] ModelError),

    /// The interactive form could not read the terminal
    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SourceError> for DaemonError {
    fn from(source: SourceError) -> Self {
        DaemonError::Source {
            platform: source.platform(),
            source,
        }
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
