use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use ws_repo::{GitIdentity, GitRepo};

use crate::error::{ExecutorError, LockError};
use crate::layout::{RepoLayout, RepoTarget};
use crate::lock::{lock_path_for, LockRegistry};

/// View ids starting with this prefix name throwaway views.
pub const TEMPORARY_VIEW_PREFIX: &str = "tmp-";

pub fn is_temporary_view(view_id: &str) -> bool {
    view_id.starts_with(TEMPORARY_VIEW_PREFIX)
}

/// How an execution holds the repository lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Exclusive lock; refuses to run while the repository is mid-rebase.
    Write,
    /// Shared lock.
    Read,
    /// Shared lock, for git-only inspection.
    GitRead,
    /// Exclusive lock on the path; the repository need not exist yet.
    Schedule,
}

impl AccessMode {
    fn exclusive(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::Schedule)
    }
}

/// Builds [`Executor`]s bound to one repository layout and lock registry.
#[derive(Debug)]
pub struct ExecutorProvider {
    layout: RepoLayout,
    locks: LockRegistry,
    identity: Option<GitIdentity>,
}

impl ExecutorProvider {
    pub fn new(layout: RepoLayout, identity: Option<GitIdentity>) -> Self {
        Self {
            layout,
            locks: LockRegistry::new(),
            identity,
        }
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Start a new execution. Defaults to [`AccessMode::Write`].
    pub fn executor(&self) -> Executor<'_> {
        Executor {
            provider: self,
            mode: AccessMode::Write,
            allow_rebasing: false,
            expected_branch: None,
        }
    }

    /// Delete a repository and its lock file from disk.
    fn discard(&self, target: &RepoTarget) {
        let path = self.layout.path(target);
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove temporary view");
                return;
            }
        }
        let lock_path = lock_path_for(&path);
        if let Err(e) = std::fs::remove_file(&lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %lock_path.display(), error = %e, "failed to remove lock file");
            }
        }
    }

    fn repo_handle(&self, path: &Path, mode: AccessMode) -> Result<GitRepo, ExecutorError> {
        let repo = match mode {
            AccessMode::Schedule => GitRepo::at(path),
            _ => GitRepo::open(path)?,
        };
        Ok(match &self.identity {
            Some(identity) => repo.with_identity(identity.clone()),
            None => repo,
        })
    }
}

/// A single locked unit of work against one repository.
///
/// ```ignore
/// provider
///     .executor()
///     .write()
///     .allow_rebasing_state()
///     .exec_view(&codebase_id, &view_id, |repo| repo.head_commit().map_err(Error::from))?;
/// ```
#[must_use]
pub struct Executor<'p> {
    provider: &'p ExecutorProvider,
    mode: AccessMode,
    allow_rebasing: bool,
    expected_branch: Option<String>,
}

impl<'p> Executor<'p> {
    /// Run even if the repository is mid-rebase.
    pub fn allow_rebasing_state(mut self) -> Self {
        self.allow_rebasing = true;
        self
    }

    /// Require HEAD to be on `branch` unless the repository is mid-rebase.
    pub fn assert_branch_name(mut self, branch: impl Into<String>) -> Self {
        self.expected_branch = Some(branch.into());
        self
    }

    pub fn write(mut self) -> Self {
        self.mode = AccessMode::Write;
        self
    }

    pub fn read(mut self) -> Self {
        self.mode = AccessMode::Read;
        self
    }

    pub fn git_read(mut self) -> Self {
        self.mode = AccessMode::GitRead;
        self
    }

    pub fn schedule(mut self) -> Self {
        self.mode = AccessMode::Schedule;
        self
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn exec_view<T, E, F>(self, codebase_id: &str, view_id: &str, action: F) -> Result<T, E>
    where
        F: FnOnce(&GitRepo) -> Result<T, E>,
        E: From<ExecutorError>,
    {
        self.exec(&RepoTarget::view(codebase_id, view_id), action)
    }

    pub fn exec_trunk<T, E, F>(self, codebase_id: &str, action: F) -> Result<T, E>
    where
        F: FnOnce(&GitRepo) -> Result<T, E>,
        E: From<ExecutorError>,
    {
        self.exec(&RepoTarget::trunk(codebase_id), action)
    }

    /// Run `action` in a throwaway view of the codebase, cloned from the trunk
    /// for this execution and removed afterwards. Implies
    /// [`allow_rebasing_state`](Self::allow_rebasing_state).
    pub fn exec_temporary_view<T, E, F>(mut self, codebase_id: &str, action: F) -> Result<T, E>
    where
        F: FnOnce(&GitRepo) -> Result<T, E>,
        E: From<ExecutorError>,
    {
        self.allow_rebasing = true;
        let provider = self.provider;
        let view_id = format!("{}{}", TEMPORARY_VIEW_PREFIX, uuid::Uuid::new_v4());
        let target = RepoTarget::view(codebase_id, &view_id);
        let trunk_url = provider
            .layout
            .trunk_path(codebase_id)
            .to_string_lossy()
            .into_owned();

        let cloned: Result<(), ExecutorError> =
            provider.executor().schedule().exec(&target, |repo| {
                GitRepo::clone_from(&trunk_url, repo.root())?;
                Ok(())
            });
        let result = match cloned {
            Ok(()) => self.exec(&target, action),
            Err(e) => Err(e.into()),
        };

        provider.discard(&target);
        result
    }

    /// Acquire the target's lock, check the repository state and run `action`.
    pub fn exec<T, E, F>(self, target: &RepoTarget, action: F) -> Result<T, E>
    where
        F: FnOnce(&GitRepo) -> Result<T, E>,
        E: From<ExecutorError>,
    {
        let started = Instant::now();
        let path = self.provider.layout.path(target);
        let lock = self.provider.locks.get(&path);

        let (result, exec_duration) = if self.mode.exclusive() {
            let guard = lock.lock().map_err(ExecutorError::from)?;
            let exec_started = Instant::now();
            let result = self.run(&path, action);
            let exec_duration = exec_started.elapsed();
            (settle(result, guard.unlock()), exec_duration)
        } else {
            let guard = lock.read().map_err(ExecutorError::from)?;
            let exec_started = Instant::now();
            let result = self.run(&path, action);
            let exec_duration = exec_started.elapsed();
            (settle(result, guard.unlock()), exec_duration)
        };

        info!(
            path = %path.display(),
            mode = ?self.mode,
            duration_ms = millis(started.elapsed()),
            exec_duration_ms = millis(exec_duration),
            "git executor completed"
        );

        result
    }

    fn run<T, E, F>(&self, path: &Path, action: F) -> Result<T, E>
    where
        F: FnOnce(&GitRepo) -> Result<T, E>,
        E: From<ExecutorError>,
    {
        let repo = self.provider.repo_handle(path, self.mode)?;
        if self.mode != AccessMode::Schedule {
            self.check_state(&repo)?;
        }
        action(&repo)
    }

    fn check_state(&self, repo: &GitRepo) -> Result<(), ExecutorError> {
        let guard_rebase = self.mode == AccessMode::Write && !self.allow_rebasing;
        if !guard_rebase && self.expected_branch.is_none() {
            return Ok(());
        }

        let rebasing = repo.is_rebasing()?;
        if rebasing && guard_rebase {
            return Err(ExecutorError::IsRebasing {
                path: repo.root().to_path_buf(),
            });
        }

        if let Some(expected) = &self.expected_branch {
            if rebasing {
                return Ok(());
            }
            match repo.head_branch() {
                Ok(actual) if actual == *expected => {}
                Ok(actual) => {
                    return Err(ExecutorError::UnexpectedBranch {
                        expected: expected.clone(),
                        actual,
                    })
                }
                Err(_) if self.allow_rebasing => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

fn settle<T, E>(result: Result<T, E>, released: Result<(), LockError>) -> Result<T, E>
where
    E: From<ExecutorError>,
{
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(ExecutorError::from(e).into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!(error = %release_err, "lock release failed after execution error");
            Err(e)
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
