//! Working tree snapshots stored as git commits.
//!
//! A snapshot is a commit whose tree is the complete working directory
//! (tracked and untracked files, minus ignored ones) and whose single parent
//! is the HEAD it was taken on. Snapshots live on `snapshot-<id>` branches in
//! the trunk repository so that any view of the codebase can restore them.

use tracing::{debug, warn};
use ws_repo::GitRepo;

pub mod error;

pub use error::{Error, Result};

/// Reference to a captured snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRef {
    pub id: String,
    /// Commit holding the captured tree.
    pub commit_id: String,
    /// Branch in the trunk repository pointing at `commit_id`.
    pub branch: String,
    pub label: Option<String>,
}

impl SnapshotRef {
    /// Reference to a previously captured snapshot.
    pub fn existing(id: impl Into<String>, commit_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            branch: snapshot_branch(&id),
            id,
            commit_id: commit_id.into(),
            label: None,
        }
    }
}

/// Branch name a snapshot is published under.
pub fn snapshot_branch(snapshot_id: &str) -> String {
    format!("snapshot-{}", snapshot_id)
}

/// Captures and restores working trees. Callers hold the repository lock.
pub trait SnapshotProvider: Send + Sync {
    /// Capture the working directory of `repo` without modifying it.
    fn capture(&self, repo: &GitRepo, snapshot_id: &str, label: Option<&str>)
        -> Result<SnapshotRef>;

    /// Replace the working directory of `repo` with the snapshot's contents,
    /// leaving them as uncommitted edits on top of the snapshot's parent.
    fn restore(&self, repo: &GitRepo, snapshot: &SnapshotRef) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct GitSnapshotProvider;

impl GitSnapshotProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SnapshotProvider for GitSnapshotProvider {
    fn capture(
        &self,
        repo: &GitRepo,
        snapshot_id: &str,
        label: Option<&str>,
    ) -> Result<SnapshotRef> {
        if repo.is_rebasing()? {
            return Err(Error::CantSnapshotRebasing);
        }

        let head = repo.head_commit()?;
        let tree = repo.write_tree_from_worktree()?;
        let message = match label {
            Some(label) => format!("Snapshot: {}", label),
            None => "Snapshot".to_string(),
        };
        let commit_id = repo.commit_tree(&tree, Some(&head), &message)?;

        let branch = snapshot_branch(snapshot_id);
        repo.create_branch_at(&branch, &commit_id)?;
        repo.push_branch(&branch)?;
        if let Err(e) = repo.delete_branch(&branch) {
            debug!(branch = %branch, error = %e, "local snapshot branch left behind");
        }

        debug!(snapshot_id, commit_id = %commit_id, "captured snapshot");

        Ok(SnapshotRef {
            id: snapshot_id.to_string(),
            commit_id,
            branch,
            label: label.map(str::to_string),
        })
    }

    fn restore(&self, repo: &GitRepo, snapshot: &SnapshotRef) -> Result<()> {
        repo.fetch_branch(&snapshot.branch)?;

        let parents = repo.commit_parents(&snapshot.commit_id)?;
        if parents.len() != 1 {
            return Err(Error::UnexpectedParents {
                commit: snapshot.commit_id.clone(),
                count: parents.len(),
            });
        }

        repo.reset_hard(&snapshot.commit_id)?;
        repo.clean_untracked()?;
        if let Err(e) = repo.large_files_pull() {
            warn!(snapshot_id = %snapshot.id, error = %e, "failed to pull large files after restore");
        }
        repo.reset_mixed(&parents[0])?;

        debug!(snapshot_id = %snapshot.id, "restored snapshot");
        Ok(())
    }
}
