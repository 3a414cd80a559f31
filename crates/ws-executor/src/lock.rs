//! Per-repository locking.
//!
//! A [`RepoLock`] pairs an in-process reader/writer lock with an advisory
//! `flock(2)` on a sibling `<repo>.lock` file, so threads of this process and
//! other processes sharing the same repository never interleave mutations.
//!
//! Shared holders are counted: only the 0→1 transition takes the shared file
//! lock and only the 1→0 transition releases it.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::error::LockError;

#[derive(Default)]
struct ReaderState {
    count: usize,
    file: Option<File>,
}

pub struct RepoLock {
    lock_path: PathBuf,
    inner: RwLock<()>,
    readers: Mutex<ReaderState>,
}

impl RepoLock {
    /// Lock guarding the repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Self {
        Self {
            lock_path: lock_path_for(repo_path.as_ref()),
            inner: RwLock::new(()),
            readers: Mutex::new(ReaderState::default()),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Number of shared holders in this process.
    pub fn reader_count(&self) -> usize {
        self.readers.lock().count
    }

    /// Take the exclusive lock, blocking until every reader and writer is gone.
    pub fn lock(&self) -> Result<ExclusiveGuard<'_>, LockError> {
        let guard = self.inner.write();
        let file = self.open_file()?;
        fs2::FileExt::lock_exclusive(&file).map_err(|source| LockError::Acquire {
            path: self.lock_path.clone(),
            source,
        })?;

        Ok(ExclusiveGuard {
            lock: self,
            file: Some(file),
            _guard: guard,
        })
    }

    /// Take a shared lock. Reentrant within this process.
    pub fn read(&self) -> Result<SharedGuard<'_>, LockError> {
        let guard = self.inner.read_recursive();

        {
            let mut state = self.readers.lock();
            if state.count == 0 {
                let file = self.open_file()?;
                fs2::FileExt::lock_shared(&file).map_err(|source| LockError::Acquire {
                    path: self.lock_path.clone(),
                    source,
                })?;
                state.file = Some(file);
            }
            state.count += 1;
        }

        Ok(SharedGuard {
            lock: self,
            guard: Some(guard),
        })
    }

    fn release_shared(&self) -> Result<(), LockError> {
        let mut state = self.readers.lock();
        state.count = state.count.saturating_sub(1);
        if state.count > 0 {
            return Ok(());
        }

        match state.file.take() {
            Some(file) => fs2::FileExt::unlock(&file).map_err(|source| LockError::Release {
                path: self.lock_path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    fn open_file(&self) -> Result<File, LockError> {
        let open_err = |source| LockError::Open {
            path: self.lock_path.clone(),
            source,
        };

        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(open_err)?;
        }

        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(open_err)
    }
}

impl std::fmt::Debug for RepoLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLock")
            .field("lock_path", &self.lock_path)
            .field("readers", &self.reader_count())
            .finish()
    }
}

/// Held exclusive lock. Released by [`ExclusiveGuard::unlock`] or on drop.
pub struct ExclusiveGuard<'a> {
    lock: &'a RepoLock,
    file: Option<File>,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl ExclusiveGuard<'_> {
    /// Release the lock, reporting a failure to drop the file lock.
    pub fn unlock(mut self) -> Result<(), LockError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), LockError> {
        match self.file.take() {
            Some(file) => fs2::FileExt::unlock(&file).map_err(|source| LockError::Release {
                path: self.lock.lock_path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release exclusive repository lock");
        }
    }
}

/// Held shared lock. Released by [`SharedGuard::unlock`] or on drop.
pub struct SharedGuard<'a> {
    lock: &'a RepoLock,
    guard: Option<RwLockReadGuard<'a, ()>>,
}

impl SharedGuard<'_> {
    pub fn unlock(mut self) -> Result<(), LockError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), LockError> {
        match self.guard.take() {
            Some(guard) => {
                let result = self.lock.release_shared();
                drop(guard);
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release shared repository lock");
        }
    }
}

/// Hands out one [`RepoLock`] per repository path for this process.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<RepoLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `repo_path`. Entries nobody outside the registry holds are
    /// evicted on the way, so removed repositories do not accumulate.
    pub fn get<P: AsRef<Path>>(&self, repo_path: P) -> Arc<RepoLock> {
        let path = repo_path.as_ref().to_path_buf();
        let mut locks = self.locks.lock();
        locks.retain(|key, lock| *key == path || Arc::strong_count(lock) > 1);
        locks
            .entry(path)
            .or_insert_with_key(|path| Arc::new(RepoLock::new(path)))
            .clone()
    }

    /// Number of repositories with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// `<repo>.lock`, next to the repository directory.
pub fn lock_path_for(repo_path: &Path) -> PathBuf {
    let mut name: OsString = repo_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
