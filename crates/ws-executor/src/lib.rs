//! Serialized access to on-disk repositories.
//!
//! All git work against a trunk or view goes through an [`Executor`], which
//! takes the repository's [`RepoLock`] in the requested [`AccessMode`] and
//! refuses to mutate a repository that is mid-rebase unless told otherwise.

pub mod error;
pub mod executor;
pub mod layout;
pub mod lock;

pub use error::{ExecutorError, LockError, Result};
pub use executor::{
    is_temporary_view, AccessMode, Executor, ExecutorProvider, TEMPORARY_VIEW_PREFIX,
};
pub use layout::{RepoLayout, RepoTarget};
pub use lock::{ExclusiveGuard, LockRegistry, RepoLock, SharedGuard};
