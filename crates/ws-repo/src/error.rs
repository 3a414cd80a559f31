use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Repository not found at path: {0}")]
    RepositoryNotFound(String),

    #[error("Invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("Branch '{0}' does not exist")]
    BranchNotFound(String),

    #[error("No rebase in progress at: {0}")]
    NoRebaseInProgress(String),

    #[error("Command execution failed: {command} (exit code: {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Unknown VCS error: {0}")]
    Other(String),
}

impl VcsError {
    /// Exit code of a failed git invocation, if this error came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            VcsError::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

pub type VcsResult<T> = Result<T, VcsError>;
