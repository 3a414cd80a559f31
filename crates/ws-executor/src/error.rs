use std::path::PathBuf;
use thiserror::Error;
use ws_repo::VcsError;

/// Failures of the cross-process advisory lock. None of them are swallowed.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to acquire lock {path}: {source}")]
    Acquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to release lock {path}: {source}")]
    Release {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("repository at {path} is in a rebasing state")]
    IsRebasing { path: PathBuf },

    #[error("unexpected branch: expected {expected}, found {actual}")]
    UnexpectedBranch { expected: String, actual: String },

    #[error(transparent)]
    Vcs(#[from] VcsError),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
