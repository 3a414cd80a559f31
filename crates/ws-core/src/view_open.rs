//! Moving a workspace's working directory between views.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use ws_executor::ExecutorProvider;
use ws_local_db::{SnapshotRecord, ViewRecord, WorkspaceRecord};
use ws_repo::GitRepo;

use crate::db::DatabaseManager;
use crate::error::GitContext;
use crate::events::{EventPublisher, EventType, Topic};
use crate::snapshotter::{SnapshotAction, SnapshotOptions, Snapshotter};
use crate::{Error, Result};

/// How a workspace lands on a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    /// Same owner: the workspace leaves its previous view.
    Move,
    /// Different owner: the view gets a copy and the workspace stays put.
    Copy,
}

impl AttachMode {
    pub fn for_users(view_user: &str, workspace_user: &str) -> Self {
        if view_user == workspace_user {
            AttachMode::Move
        } else {
            AttachMode::Copy
        }
    }
}

pub struct ViewAttachment {
    db: DatabaseManager,
    executors: Arc<ExecutorProvider>,
    snapshotter: Arc<Snapshotter>,
    events: EventPublisher,
}

impl ViewAttachment {
    pub fn new(
        db: DatabaseManager,
        executors: Arc<ExecutorProvider>,
        snapshotter: Arc<Snapshotter>,
        events: EventPublisher,
    ) -> Self {
        Self {
            db,
            executors,
            snapshotter,
            events,
        }
    }

    /// Open `workspace_id` on `view_id`, preserving the uncommitted edits of
    /// whatever the view hosted before and of the view the workspace leaves.
    ///
    /// Fails with [`Error::Rebasing`] when either repository involved is
    /// mid-rebase.
    pub fn open_workspace_on_view(&self, view_id: &str, workspace_id: &str) -> Result<ViewRecord> {
        let view = self.db.view(view_id)?;
        let workspace = self.db.workspace(workspace_id)?;

        if workspace.is_archived() {
            return Err(Error::Archived {
                id: workspace.id.clone(),
            });
        }
        if workspace.codebase_id != view.codebase_id {
            return Err(Error::CodebaseMismatch {
                workspace_id: workspace.id.clone(),
                view_id: view.id.clone(),
            });
        }
        if view.workspace_id.as_deref() == Some(workspace.id.as_str()) {
            info!(view_id, workspace_id, "workspace already open on view");
            return Ok(view);
        }

        let mode = AttachMode::for_users(&view.user_id, &workspace.user_id);

        if let Some(current_id) = view.workspace_id.as_deref() {
            self.vacate(&view, current_id)?;
        }

        if let Some(previous_view) = workspace.view_id.as_deref().filter(|v| *v != view.id) {
            self.snapshotter
                .snapshot(
                    &workspace.codebase_id,
                    &workspace.id,
                    SnapshotAction::PreCheckoutOtherView,
                    SnapshotOptions::new().on_view(previous_view).mark_as_latest(),
                )
                .map_err(rebasing_to_hand_off_error)?;
        }

        // Reload to pick up the snapshot just marked latest.
        let workspace = self.db.workspace(workspace_id)?;
        let transplant = self.db.latest_snapshot(&workspace)?;

        self.executors
            .executor()
            .write()
            .exec_view(&view.codebase_id, &view.id, |repo| {
                self.checkout_on_repo(repo, &workspace, transplant.as_ref())
            })
            .map_err(rebasing_to_hand_off_error)?;

        self.db
            .attach(&view.id, &workspace.id, mode == AttachMode::Move)?;

        self.events.publish(
            Topic::View(view.id.clone()),
            EventType::ViewUpdated,
            &view.id,
        );
        self.events.publish(
            Topic::Codebase(view.codebase_id.clone()),
            EventType::ViewUpdated,
            &view.id,
        );

        info!(view_id, workspace_id, mode = ?mode, "opened workspace on view");
        self.db.view(view_id)
    }

    /// Snapshot and detach the workspace currently hosted on `view`.
    fn vacate(&self, view: &ViewRecord, current_id: &str) -> Result<()> {
        let current = match self.db.workspace(current_id) {
            Ok(current) => current,
            Err(Error::NotFound { .. }) => {
                warn!(view_id = %view.id, workspace_id = current_id, "view points at a missing workspace");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // A view holding a copy keeps its edits in the chain but never
        // becomes what the owner restores from.
        let hosts_workspace = current.view_id.as_deref() == Some(view.id.as_str());
        let mut options = SnapshotOptions::new().on_view(&view.id);
        if hosts_workspace {
            options = options.mark_as_latest();
        }
        self.snapshotter
            .snapshot(
                &view.codebase_id,
                &current.id,
                SnapshotAction::PreCheckoutOtherWorkspace,
                options,
            )
            .map_err(rebasing_to_hand_off_error)?;

        if hosts_workspace {
            self.db.detach_workspace(&current.id)?;
        }
        Ok(())
    }

    fn checkout_on_repo(
        &self,
        repo: &GitRepo,
        workspace: &WorkspaceRecord,
        transplant: Option<&SnapshotRecord>,
    ) -> Result<()> {
        checkout_workspace_branch(repo, &workspace.id)?;

        match transplant {
            Some(snapshot) => self.snapshotter.restore(repo, snapshot),
            None => {
                if let Err(e) = repo.large_files_pull() {
                    warn!(workspace_id = %workspace.id, error = %e, "failed to pull large files");
                }
                Ok(())
            }
        }
    }
}

/// Check out the workspace branch as published in the trunk, discarding
/// anything left in the working directory.
pub(crate) fn checkout_workspace_branch(repo: &GitRepo, branch: &str) -> Result<()> {
    if repo.head_branch().ok().as_deref() == Some(branch) {
        return Ok(());
    }

    repo.fetch_branch(branch).git_op("fetch_workspace", repo)?;
    let start = format!("origin/{}", branch);
    repo.checkout_branch_force(branch, Some(&start))
        .git_op("checkout_workspace", repo)?;
    repo.clean_untracked().git_op("clean_untracked", repo)
}

fn rebasing_to_hand_off_error(err: Error) -> Error {
    if err.is_rebasing() {
        Error::Rebasing
    } else {
        err
    }
}
