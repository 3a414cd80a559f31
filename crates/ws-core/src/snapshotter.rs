//! Snapshot capture bound to workspace metadata.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use ws_executor::ExecutorProvider;
use ws_local_db::{now_timestamp, SnapshotRecord, WorkspaceRecord};
use ws_repo::GitRepo;
use ws_snapshots::{SnapshotProvider, SnapshotRef};

use crate::db::DatabaseManager;
use crate::{Error, Result};

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotAction {
    ViewSync,
    SyncCompleted,
    PreCheckoutOtherView,
    PreCheckoutOtherWorkspace,
    Manual,
}

impl SnapshotAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotAction::ViewSync => "view_sync",
            SnapshotAction::SyncCompleted => "sync_completed",
            SnapshotAction::PreCheckoutOtherView => "pre_checkout_other_view",
            SnapshotAction::PreCheckoutOtherWorkspace => "pre_checkout_other_workspace",
            SnapshotAction::Manual => "manual",
        }
    }
}

impl fmt::Display for SnapshotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "view_sync" => Ok(SnapshotAction::ViewSync),
            "sync_completed" => Ok(SnapshotAction::SyncCompleted),
            "pre_checkout_other_view" => Ok(SnapshotAction::PreCheckoutOtherView),
            "pre_checkout_other_workspace" => Ok(SnapshotAction::PreCheckoutOtherWorkspace),
            "manual" => Ok(SnapshotAction::Manual),
            other => Err(format!("unknown snapshot action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    view_id: Option<String>,
    mark_as_latest: bool,
}

impl SnapshotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot this view instead of the one hosting the workspace.
    pub fn on_view(mut self, view_id: impl Into<String>) -> Self {
        self.view_id = Some(view_id.into());
        self
    }

    pub fn mark_as_latest(mut self) -> Self {
        self.mark_as_latest = true;
        self
    }
}

pub struct Snapshotter {
    db: DatabaseManager,
    executors: Arc<ExecutorProvider>,
    provider: Arc<dyn SnapshotProvider>,
}

impl Snapshotter {
    pub fn new(
        db: DatabaseManager,
        executors: Arc<ExecutorProvider>,
        provider: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self {
            db,
            executors,
            provider,
        }
    }

    /// Take a snapshot of the workspace's working directory on a view, under
    /// that view's write lock.
    pub fn snapshot(
        &self,
        codebase_id: &str,
        workspace_id: &str,
        action: SnapshotAction,
        options: SnapshotOptions,
    ) -> Result<SnapshotRecord> {
        let view_id = match options.view_id {
            Some(view_id) => view_id,
            None => self
                .db
                .workspace(workspace_id)?
                .view_id
                .ok_or_else(|| Error::WorkspaceNotOpen {
                    workspace_id: workspace_id.to_string(),
                })?,
        };

        let captured = self
            .executors
            .executor()
            .write()
            .exec_view(codebase_id, &view_id, |repo| self.capture_on_repo(repo, action))?;

        self.record(
            codebase_id,
            workspace_id,
            Some(&view_id),
            &captured,
            action,
            options.mark_as_latest,
        )
    }

    /// Capture `repo` without locking. The caller holds the write lock.
    pub fn capture_on_repo(&self, repo: &GitRepo, action: SnapshotAction) -> Result<SnapshotRef> {
        let snapshot_id = uuid::Uuid::new_v4().to_string();
        Ok(self
            .provider
            .capture(repo, &snapshot_id, Some(action.as_str()))?)
    }

    /// Persist a captured snapshot in the workspace's chain.
    pub fn record(
        &self,
        codebase_id: &str,
        workspace_id: &str,
        view_id: Option<&str>,
        captured: &SnapshotRef,
        action: SnapshotAction,
        mark_as_latest: bool,
    ) -> Result<SnapshotRecord> {
        let mut record = SnapshotRecord {
            id: captured.id.clone(),
            codebase_id: codebase_id.to_string(),
            workspace_id: workspace_id.to_string(),
            view_id: view_id.map(str::to_string),
            commit_id: captured.commit_id.clone(),
            action: action.as_str().to_string(),
            previous_snapshot_id: None,
            created_at: now_timestamp(),
            deleted_at: None,
        };
        self.db.record_snapshot(&mut record, mark_as_latest)?;

        info!(
            codebase_id,
            workspace_id,
            view_id,
            snapshot_id = %record.id,
            action = %action,
            "recorded snapshot"
        );
        Ok(record)
    }

    pub fn restore(&self, repo: &GitRepo, snapshot: &SnapshotRecord) -> Result<()> {
        let reference = SnapshotRef::existing(&snapshot.id, &snapshot.commit_id);
        Ok(self.provider.restore(repo, &reference)?)
    }

    /// Restore the workspace's latest snapshot into `repo`. Returns whether
    /// there was one.
    pub fn restore_latest(&self, repo: &GitRepo, workspace: &WorkspaceRecord) -> Result<bool> {
        match self.db.latest_snapshot(workspace)? {
            Some(snapshot) => {
                self.restore(repo, &snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
