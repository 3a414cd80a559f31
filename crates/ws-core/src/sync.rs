//! Bringing a workspace up to date with its codebase's trunk.
//!
//! A sync commits the view's uncommitted edits onto a scratch branch and
//! replays that single commit on the trunk head. A clean replay completes
//! immediately. A conflicted replay leaves git's rebase metadata on disk, and
//! that metadata is the only record of the in-progress sync: every status
//! query re-reads it from the repository.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use ws_executor::{ExecutorProvider, RepoTarget};
use ws_local_db::WorkspaceRecord;
use ws_repo::{Conflict, ConflictSide, GitRepo, IndexEntry, RebaseStart};
use ws_snapshots::SnapshotRef;

use crate::db::DatabaseManager;
use crate::error::GitContext;
use crate::events::{EventPublisher, EventType, Topic};
use crate::snapshotter::{SnapshotAction, Snapshotter};
use crate::unidiff::{self, FileDiff};
use crate::view_open::checkout_workspace_branch;
use crate::{Error, Result};

/// Message of the commit that temporarily carries a view's uncommitted edits.
pub const UNSAVED_COMMIT_MESSAGE: &str = "Unsaved workspace changes";

const SCRATCH_BRANCH_PREFIX: &str = "sync-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictingFile {
    pub path: String,
    /// Trunk's version against the common ancestor.
    pub trunk_diff: FileDiff,
    /// The workspace's version against the common ancestor.
    pub workspace_diff: FileDiff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebaseStatus {
    pub have_conflicts: bool,
    pub is_rebasing: bool,
    pub conflicting_files: Vec<ConflictingFile>,
}

impl RebaseStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn conflicting_paths(&self) -> Vec<&str> {
        self.conflicting_files.iter().map(|f| f.path.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep trunk's version.
    Trunk,
    /// Keep the workspace's version.
    Workspace,
    /// Keep whatever is on disk.
    Custom,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resolution::Trunk => "trunk",
            Resolution::Workspace => "workspace",
            Resolution::Custom => "custom",
        })
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trunk" => Ok(Resolution::Trunk),
            "workspace" => Ok(Resolution::Workspace),
            "custom" => Ok(Resolution::Custom),
            other => Err(format!(
                "unknown resolution '{}', expected trunk, workspace or custom",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResolution {
    pub path: String,
    pub resolution: Resolution,
}

impl FileResolution {
    pub fn new(path: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            path: path.into(),
            resolution,
        }
    }
}

/// Result of the locked part of a sync.
enum Outcome {
    Conflicted(RebaseStatus),
    Completed(Option<SnapshotRef>),
}

pub struct SyncService {
    db: DatabaseManager,
    executors: Arc<ExecutorProvider>,
    snapshotter: Arc<Snapshotter>,
    events: EventPublisher,
    trunk_branch: String,
}

impl SyncService {
    pub fn new(
        db: DatabaseManager,
        executors: Arc<ExecutorProvider>,
        snapshotter: Arc<Snapshotter>,
        events: EventPublisher,
        trunk_branch: impl Into<String>,
    ) -> Self {
        Self {
            db,
            executors,
            snapshotter,
            events,
            trunk_branch: trunk_branch.into(),
        }
    }

    /// Sync the workspace on the view hosting it. Conflicts are a normal
    /// result; calling again while they are unresolved returns them again.
    ///
    /// A workspace that is not open on any view is synced in a temporary
    /// view. Conflicts found there are reported but not kept: the workspace
    /// has to be opened on a view to resolve them.
    pub fn on_trunk(&self, workspace_id: &str) -> Result<RebaseStatus> {
        let workspace = self.db.workspace(workspace_id)?;
        if workspace.is_archived() {
            return Err(Error::Archived {
                id: workspace.id.clone(),
            });
        }

        let Some(view_id) = workspace.view_id.clone() else {
            let outcome = self
                .executors
                .executor()
                .write()
                .exec_temporary_view(&workspace.codebase_id, |repo| {
                    self.sync_detached_on_repo(repo, &workspace)
                })?;
            return self.finish(&workspace, None, outcome);
        };

        let outcome = self
            .executors
            .executor()
            .write()
            .allow_rebasing_state()
            .assert_branch_name(&workspace.id)
            .exec_view(&workspace.codebase_id, &view_id, |repo| {
                self.sync_on_repo(repo, &workspace.id)
            })?;

        self.finish(&workspace, Some(&view_id), outcome)
    }

    /// Conflict status of a view or the trunk, derived from disk.
    pub fn status(&self, target: &RepoTarget) -> Result<RebaseStatus> {
        match target {
            RepoTarget::Trunk { .. } => Ok(RebaseStatus::idle()),
            RepoTarget::View { .. } => self
                .executors
                .executor()
                .write()
                .allow_rebasing_state()
                .exec(target, |repo| self.status_on_repo(repo)),
        }
    }

    pub fn view_status(&self, view_id: &str) -> Result<RebaseStatus> {
        let view = self.db.view(view_id)?;
        self.status(&RepoTarget::view(view.codebase_id, view.id))
    }

    /// Apply conflict resolutions and finish the in-progress sync on a view.
    pub fn resolve(&self, view_id: &str, resolutions: &[FileResolution]) -> Result<RebaseStatus> {
        let view = self.db.view(view_id)?;
        let workspace_id = view
            .workspace_id
            .clone()
            .ok_or_else(|| Error::not_found("workspace on view", view_id))?;
        let workspace = self.db.workspace(&workspace_id)?;

        let snapshot = self
            .executors
            .executor()
            .write()
            .allow_rebasing_state()
            .exec_view(&view.codebase_id, &view.id, |repo| {
                self.resolve_on_repo(repo, &workspace.id, resolutions)
            })?;

        self.finish(&workspace, Some(&view.id), Outcome::Completed(snapshot))
    }

    /// Sync a workspace's branch and saved edits in a throwaway checkout.
    fn sync_detached_on_repo(&self, repo: &GitRepo, workspace: &WorkspaceRecord) -> Result<Outcome> {
        checkout_workspace_branch(repo, &workspace.id)?;
        self.snapshotter.restore_latest(repo, workspace)?;

        match self.sync_on_repo(repo, &workspace.id)? {
            Outcome::Conflicted(status) => Ok(Outcome::Conflicted(RebaseStatus {
                is_rebasing: false,
                ..status
            })),
            completed => Ok(completed),
        }
    }

    fn sync_on_repo(&self, repo: &GitRepo, branch: &str) -> Result<Outcome> {
        if repo.is_rebasing().git_op("rebase_status", repo)? {
            info!(path = %repo.root().display(), "sync already in progress, reporting conflicts");
            return Ok(Outcome::Conflicted(self.status_on_repo(repo)?));
        }

        repo.fetch_branch(&self.trunk_branch)
            .git_op("fetch_trunk", repo)?;
        let trunk_head = repo
            .rev_parse(&format!("origin/{}", self.trunk_branch))
            .git_op("resolve_trunk", repo)?;

        let scratch = format!("{}{}", SCRATCH_BRANCH_PREFIX, uuid::Uuid::new_v4());
        repo.checkout_new_branch(&scratch)
            .git_op("checkout_scratch", repo)?;
        repo.add_all().git_op("stage_changes", repo)?;

        if !repo.has_staged_changes().git_op("diff_index", repo)? {
            repo.reset_hard(&trunk_head).git_op("fast_forward", repo)?;
            return self.complete(repo, branch, false).map(Outcome::Completed);
        }

        let unsaved = repo
            .commit(UNSAVED_COMMIT_MESSAGE)
            .git_op("commit_unsaved", repo)?;
        let upstream = format!("{}^", unsaved);
        match repo
            .rebase_onto(&trunk_head, &upstream)
            .git_op("rebase", repo)?
        {
            RebaseStart::Conflicted => {
                if let Err(e) = repo.large_files_pull() {
                    error!(error = %e, "failed to pull large files after conflicted rebase");
                }
                Ok(Outcome::Conflicted(self.status_on_repo(repo)?))
            }
            RebaseStart::Completed => {
                let reset = should_reset_head(repo, &trunk_head)?;
                self.complete(repo, branch, reset).map(Outcome::Completed)
            }
        }
    }

    fn resolve_on_repo(
        &self,
        repo: &GitRepo,
        branch: &str,
        resolutions: &[FileResolution],
    ) -> Result<Option<SnapshotRef>> {
        if !repo.is_rebasing().git_op("rebase_status", repo)? {
            return Err(Error::rebase_state("no rebase in progress"));
        }
        let onto = repo.rebase_onto_commit().git_op("rebase_onto", repo)?;

        let conflicts = repo.conflicts().git_op("list_conflicts", repo)?;
        let mut planned = Vec::with_capacity(resolutions.len());
        let mut seen = HashSet::new();
        for resolution in resolutions {
            if !seen.insert(resolution.path.as_str()) {
                return Err(Error::InvalidResolution {
                    path: resolution.path.clone(),
                    reason: "file is listed more than once".to_string(),
                });
            }
            let conflict = conflicts
                .iter()
                .find(|c| c.path == resolution.path)
                .ok_or_else(|| Error::InvalidResolution {
                    path: resolution.path.clone(),
                    reason: "file is not conflicted".to_string(),
                })?;
            planned.push((conflict, resolution.resolution));
        }
        for (conflict, resolution) in planned {
            apply_resolution(repo, conflict, resolution)?;
        }

        let remaining = repo.conflicts().git_op("list_conflicts", repo)?;
        if !remaining.is_empty() {
            let paths: Vec<&str> = remaining.iter().map(|c| c.path.as_str()).collect();
            return Err(Error::rebase_state(format!(
                "unresolved conflicts remain: {}",
                paths.join(", ")
            )));
        }

        repo.add_all().git_op("stage_resolution", repo)?;
        let step = if repo.has_staged_changes().git_op("diff_index", repo)? {
            repo.rebase_continue().git_op("rebase_continue", repo)?
        } else {
            repo.rebase_skip().git_op("rebase_skip", repo)?
        };
        if step == RebaseStart::Conflicted || repo.is_rebasing().git_op("rebase_status", repo)? {
            return Err(Error::rebase_state("rebase still has conflicts after resolution"));
        }

        let reset = should_reset_head(repo, &onto)?;
        self.complete(repo, branch, reset)
    }

    /// Shared tail of a successful sync. Runs under the view's write lock.
    fn complete(&self, repo: &GitRepo, branch: &str, reset_head: bool) -> Result<Option<SnapshotRef>> {
        let scratch = repo.head_branch().ok().filter(|b| b != branch);

        repo.checkout_branch_force(branch, Some("HEAD"))
            .git_op("checkout_workspace", repo)?;
        if let Err(e) = repo.large_files_pull() {
            warn!(error = %e, "failed to pull large files after sync");
        }

        if reset_head {
            let head = repo.head_commit().git_op("resolve_head", repo)?;
            let parents = repo.commit_parents(&head).git_op("read_parents", repo)?;
            if parents.len() != 1 {
                return Err(Error::rebase_state(format!(
                    "expected synced commit {} to have one parent, found {}",
                    head,
                    parents.len()
                )));
            }
            repo.reset_mixed(&parents[0])
                .git_op("reset_unsaved", repo)?;
        }

        repo.force_push(branch).git_op("push_workspace", repo)?;

        if let Some(scratch) = scratch {
            if let Err(e) = repo.delete_branch(&scratch) {
                warn!(branch = %scratch, error = %e, "failed to delete scratch branch");
            }
        }

        match self
            .snapshotter
            .capture_on_repo(repo, SnapshotAction::SyncCompleted)
        {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                error!(error = %e, "failed to snapshot after sync");
                Ok(None)
            }
        }
    }

    fn finish(
        &self,
        workspace: &WorkspaceRecord,
        view_id: Option<&str>,
        outcome: Outcome,
    ) -> Result<RebaseStatus> {
        let snapshot = match outcome {
            Outcome::Conflicted(status) => {
                info!(
                    workspace_id = %workspace.id,
                    view_id,
                    conflicts = status.conflicting_files.len(),
                    "sync stopped on conflicts"
                );
                return Ok(status);
            }
            Outcome::Completed(snapshot) => snapshot,
        };

        if let Some(snapshot) = snapshot {
            if let Err(e) = self.snapshotter.record(
                &workspace.codebase_id,
                &workspace.id,
                view_id,
                &snapshot,
                SnapshotAction::SyncCompleted,
                true,
            ) {
                error!(workspace_id = %workspace.id, error = %e, "failed to record sync snapshot");
            }
        }

        self.db.mark_workspace_updated(&workspace.id)?;

        self.events.publish(
            Topic::Workspace(workspace.id.clone()),
            EventType::WorkspaceUpdated,
            &workspace.id,
        );
        if let Some(view_id) = view_id {
            self.events
                .publish(Topic::View(view_id.to_string()), EventType::ViewUpdated, view_id);
            self.events.publish(
                Topic::Codebase(workspace.codebase_id.clone()),
                EventType::ViewUpdated,
                view_id,
            );
        }

        info!(workspace_id = %workspace.id, view_id, "workspace synced with trunk");
        Ok(RebaseStatus::idle())
    }

    fn status_on_repo(&self, repo: &GitRepo) -> Result<RebaseStatus> {
        if !repo.is_rebasing().git_op("rebase_status", repo)? {
            return Ok(RebaseStatus::idle());
        }

        let conflicts = repo.conflicts().git_op("list_conflicts", repo)?;
        let conflicting_files = conflicts
            .iter()
            .map(|conflict| describe_conflict(repo, conflict))
            .collect::<Result<Vec<_>>>()?;

        Ok(RebaseStatus {
            have_conflicts: !conflicting_files.is_empty(),
            is_rebasing: true,
            conflicting_files,
        })
    }
}

/// Whether the unsaved commit survived the replay and must be turned back
/// into uncommitted edits.
fn should_reset_head(repo: &GitRepo, onto: &str) -> Result<bool> {
    match repo.commit_count(onto, "HEAD").git_op("count_rebased", repo)? {
        0 => Ok(false),
        1 => Ok(true),
        n => Err(Error::rebase_state(format!(
            "expected at most one rebased commit on top of {}, found {}",
            onto, n
        ))),
    }
}

fn apply_resolution(repo: &GitRepo, conflict: &Conflict, resolution: Resolution) -> Result<()> {
    let path = conflict.path.as_str();
    let side = match resolution {
        Resolution::Trunk => Some((ConflictSide::Ours, &conflict.ours)),
        Resolution::Workspace => Some((ConflictSide::Theirs, &conflict.theirs)),
        Resolution::Custom => None,
    };

    match side {
        Some((side, Some(_))) => {
            repo.checkout_conflict_side(path, side)
                .git_op("checkout_side", repo)?;
            repo.stage_path(path).git_op("stage_path", repo)
        }
        Some((_, None)) => repo.remove_path(path).git_op("remove_path", repo),
        None => {
            if repo.root().join(path).symlink_metadata().is_ok() {
                repo.stage_path(path).git_op("stage_path", repo)
            } else {
                repo.remove_path(path).git_op("remove_path", repo)
            }
        }
    }
}

fn describe_conflict(repo: &GitRepo, conflict: &Conflict) -> Result<ConflictingFile> {
    let read = |entry: &Option<IndexEntry>| -> Result<Option<Vec<u8>>> {
        match entry {
            Some(entry) => Ok(Some(repo.read_blob(&entry.oid).git_op("read_blob", repo)?)),
            None => Ok(None),
        }
    };
    let ancestor = read(&conflict.ancestor)?;
    let trunk = read(&conflict.ours)?;
    let workspace = read(&conflict.theirs)?;

    Ok(ConflictingFile {
        path: conflict.path.clone(),
        trunk_diff: unidiff::decorate(&conflict.path, ancestor.as_deref(), trunk.as_deref()),
        workspace_diff: unidiff::decorate(
            &conflict.path,
            ancestor.as_deref(),
            workspace.as_deref(),
        ),
    })
}
