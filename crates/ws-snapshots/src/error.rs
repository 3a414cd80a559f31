//! Error types for snapshot operations.

use ws_repo::VcsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can't snapshot a repository that is in a rebasing state")]
    CantSnapshotRebasing,

    #[error("snapshot commit {commit} has {count} parents, expected exactly one")]
    UnexpectedParents { commit: String, count: usize },

    #[error("git error: {0}")]
    Vcs(#[from] VcsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider error: {message}")]
    Provider { message: String },
}

impl Error {
    /// Create a new provider error.
    pub fn provider<S: Into<String>>(message: S) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, Error>;
