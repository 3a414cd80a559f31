//! Thin wrapper over the `git` command line.
//!
//! Every operation shells out to `git` with system configuration and
//! interactive prompts disabled, so the sync engine behaves the same on
//! every host regardless of the user's setup.

pub mod error;
pub mod repo;
pub mod test_helpers;

pub use error::{VcsError, VcsResult};
pub use repo::{Conflict, ConflictSide, GitIdentity, GitRepo, IndexEntry, RebaseStart};
