//! Core error types for the sync engine.

use std::path::PathBuf;

use ws_executor::{ExecutorError, LockError};
use ws_repo::{GitRepo, VcsError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A structural invariant of a rebase was violated.
    #[error("rebase state error: {message}")]
    RebaseState { message: String },

    #[error("git {operation} failed in {}: {source}", .path.display())]
    GitOperation {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    /// The target view is mid-rebase; its conflicts must be resolved first.
    #[error("rebasing in progress")]
    Rebasing,

    #[error("unexpected branch: expected {expected}, found {actual}")]
    UnexpectedBranch { expected: String, actual: String },

    #[error("workspace {id} is archived")]
    Archived { id: String },

    #[error("workspace {workspace_id} and view {view_id} belong to different codebases")]
    CodebaseMismatch {
        workspace_id: String,
        view_id: String,
    },

    #[error("workspace {workspace_id} is not open on any view")]
    WorkspaceNotOpen { workspace_id: String },

    #[error("invalid resolution for {path}: {reason}")]
    InvalidResolution { path: String, reason: String },

    #[error("git error: {0}")]
    Vcs(#[from] VcsError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] ws_snapshots::Error),

    #[error("Database error: {0}")]
    Database(#[from] ws_local_db::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found<S: Into<String>>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn rebase_state<S: Into<String>>(message: S) -> Self {
        Self::RebaseState {
            message: message.into(),
        }
    }

    /// Whether this error was caused by a rebase in progress on the target.
    pub fn is_rebasing(&self) -> bool {
        matches!(
            self,
            Error::Rebasing | Error::Snapshot(ws_snapshots::Error::CantSnapshotRebasing)
        ) || matches!(self, Error::RebaseState { message } if message.starts_with(REBASING_PREFIX))
    }
}

const REBASING_PREFIX: &str = "repository is rebasing";

impl From<ExecutorError> for Error {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Lock(e) => Error::Lock(e),
            ExecutorError::IsRebasing { path } => {
                Error::rebase_state(format!("{}: {}", REBASING_PREFIX, path.display()))
            }
            ExecutorError::UnexpectedBranch { expected, actual } => {
                Error::UnexpectedBranch { expected, actual }
            }
            ExecutorError::Vcs(e) => Error::Vcs(e),
        }
    }
}

/// Attach the operation name and repository path to git failures.
pub trait GitContext<T> {
    fn git_op(self, operation: &'static str, repo: &GitRepo) -> crate::Result<T>;
}

impl<T> GitContext<T> for Result<T, VcsError> {
    fn git_op(self, operation: &'static str, repo: &GitRepo) -> crate::Result<T> {
        self.map_err(|source| Error::GitOperation {
            operation,
            path: repo.root().to_path_buf(),
            source,
        })
    }
}
