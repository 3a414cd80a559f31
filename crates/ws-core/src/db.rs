//! Database access for the engine services.

use std::path::Path;

use ws_local_db::{
    CodebaseRecord, CodebaseStore, Database, SnapshotRecord, SnapshotStore, ViewRecord, ViewStore,
    WorkspaceRecord, WorkspaceStore,
};

use crate::{Error, Result};

/// Thin wrapper over [`Database`] that turns missing rows into
/// [`Error::NotFound`].
#[derive(Clone, Debug)]
pub struct DatabaseManager {
    db: Database,
}

impl DatabaseManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (and migrate) the database at `path`.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn codebase(&self, id: &str) -> Result<CodebaseRecord> {
        self.db
            .with_conn(|conn| CodebaseStore::new(conn).get(id))?
            .ok_or_else(|| Error::not_found("codebase", id))
    }

    pub fn workspace(&self, id: &str) -> Result<WorkspaceRecord> {
        self.db
            .with_conn(|conn| WorkspaceStore::new(conn).get(id))?
            .ok_or_else(|| Error::not_found("workspace", id))
    }

    pub fn view(&self, id: &str) -> Result<ViewRecord> {
        self.db
            .with_conn(|conn| ViewStore::new(conn).get(id))?
            .ok_or_else(|| Error::not_found("view", id))
    }

    pub fn snapshot(&self, id: &str) -> Result<SnapshotRecord> {
        self.db
            .with_conn(|conn| SnapshotStore::new(conn).get(id))?
            .ok_or_else(|| Error::not_found("snapshot", id))
    }

    /// The snapshot the workspace should be restored from, if any.
    pub fn latest_snapshot(&self, workspace: &WorkspaceRecord) -> Result<Option<SnapshotRecord>> {
        match &workspace.latest_snapshot_id {
            Some(id) => self.snapshot(id).map(Some),
            None => Ok(None),
        }
    }

    pub fn list_snapshots(&self, workspace_id: &str) -> Result<Vec<SnapshotRecord>> {
        Ok(self
            .db
            .with_conn(|conn| SnapshotStore::new(conn).list_by_workspace(workspace_id))?)
    }

    pub fn list_workspaces(&self, codebase_id: &str) -> Result<Vec<WorkspaceRecord>> {
        Ok(self
            .db
            .with_conn(|conn| WorkspaceStore::new(conn).list_by_codebase(codebase_id))?)
    }

    pub fn insert_codebase(&self, record: &CodebaseRecord) -> Result<()> {
        Ok(self.db.with_conn(|conn| CodebaseStore::new(conn).insert(record))?)
    }

    pub fn insert_workspace(&self, record: &WorkspaceRecord) -> Result<()> {
        Ok(self.db.with_conn(|conn| WorkspaceStore::new(conn).insert(record))?)
    }

    pub fn insert_view(&self, record: &ViewRecord) -> Result<()> {
        Ok(self.db.with_conn(|conn| ViewStore::new(conn).insert(record))?)
    }

    /// Insert a snapshot chained to the workspace's current latest one and
    /// optionally make it the latest.
    pub fn record_snapshot(&self, record: &mut SnapshotRecord, mark_as_latest: bool) -> Result<()> {
        Ok(self.db.transaction(|conn| {
            let snapshots = SnapshotStore::new(conn);
            record.previous_snapshot_id = snapshots
                .latest_in_workspace(&record.workspace_id)?
                .map(|s| s.id);
            snapshots.insert(record)?;
            if mark_as_latest {
                WorkspaceStore::new(conn).set_latest_snapshot_id(&record.workspace_id, &record.id)?;
            }
            Ok(())
        })?)
    }

    pub fn mark_workspace_updated(&self, id: &str) -> Result<()> {
        Ok(self.db.with_conn(|conn| WorkspaceStore::new(conn).mark_updated(id))?)
    }

    pub fn archive_workspace(&self, id: &str) -> Result<()> {
        Ok(self.db.transaction(|conn| {
            let workspaces = WorkspaceStore::new(conn);
            if let Some(view_id) = workspaces.get(id)?.and_then(|ws| ws.view_id) {
                ViewStore::new(conn).set_workspace_id(&view_id, None)?;
            }
            workspaces.archive(id)
        })?)
    }

    /// Detach a workspace from whatever view hosts it.
    pub fn detach_workspace(&self, workspace_id: &str) -> Result<()> {
        Ok(self
            .db
            .with_conn(|conn| WorkspaceStore::new(conn).set_view_id(workspace_id, None))?)
    }

    /// Point the view at the workspace. With `move_workspace`, the workspace
    /// points back at the view and the view it left stops hosting it.
    pub fn attach(&self, view_id: &str, workspace_id: &str, move_workspace: bool) -> Result<()> {
        Ok(self.db.transaction(|conn| {
            let workspaces = WorkspaceStore::new(conn);
            let views = ViewStore::new(conn);
            if move_workspace {
                let previous = workspaces.get(workspace_id)?.and_then(|ws| ws.view_id);
                if let Some(previous) = previous.filter(|v| v != view_id) {
                    views.set_workspace_id(&previous, None)?;
                }
                workspaces.set_view_id(workspace_id, Some(view_id))?;
            }
            views.set_workspace_id(view_id, Some(workspace_id))?;
            views.touch(view_id)
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_local_db::now_timestamp;

    fn seeded() -> DatabaseManager {
        let db = DatabaseManager::in_memory().unwrap();
        db.insert_codebase(&CodebaseRecord {
            id: "c1".into(),
            name: "demo".into(),
            created_at: now_timestamp(),
            archived_at: None,
        })
        .unwrap();
        for id in ["w1", "w2"] {
            db.insert_workspace(&WorkspaceRecord {
                id: id.into(),
                codebase_id: "c1".into(),
                user_id: "alice".into(),
                name: id.into(),
                view_id: None,
                latest_snapshot_id: None,
                created_at: now_timestamp(),
                updated_at: now_timestamp(),
                archived_at: None,
            })
            .unwrap();
        }
        for id in ["v1", "v2"] {
            db.insert_view(&ViewRecord {
                id: id.into(),
                codebase_id: "c1".into(),
                user_id: "alice".into(),
                workspace_id: None,
                mount_path: None,
                mount_hostname: None,
                created_at: now_timestamp(),
                last_used_at: None,
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let db = seeded();
        assert!(matches!(
            db.workspace("nope"),
            Err(Error::NotFound { kind: "workspace", .. })
        ));
        assert!(matches!(db.view("nope"), Err(Error::NotFound { kind: "view", .. })));
    }

    #[test]
    fn test_move_attach_clears_previous_view() {
        let db = seeded();
        db.attach("v1", "w1", true).unwrap();
        db.attach("v2", "w1", true).unwrap();

        assert_eq!(db.workspace("w1").unwrap().view_id.as_deref(), Some("v2"));
        assert!(db.view("v1").unwrap().workspace_id.is_none());
        assert_eq!(db.view("v2").unwrap().workspace_id.as_deref(), Some("w1"));
        assert!(db.view("v2").unwrap().last_used_at.is_some());
    }

    #[test]
    fn test_copy_attach_keeps_workspace_home() {
        let db = seeded();
        db.attach("v1", "w1", true).unwrap();
        db.attach("v2", "w1", false).unwrap();

        assert_eq!(db.workspace("w1").unwrap().view_id.as_deref(), Some("v1"));
        assert_eq!(db.view("v1").unwrap().workspace_id.as_deref(), Some("w1"));
        assert_eq!(db.view("v2").unwrap().workspace_id.as_deref(), Some("w1"));
    }

    #[test]
    fn test_snapshot_chain_and_latest() {
        let db = seeded();
        let snapshot = |id: &str, latest: bool| {
            let mut record = SnapshotRecord {
                id: id.into(),
                codebase_id: "c1".into(),
                workspace_id: "w1".into(),
                view_id: Some("v1".into()),
                commit_id: "0".repeat(40),
                action: "manual".into(),
                previous_snapshot_id: None,
                created_at: now_timestamp(),
                deleted_at: None,
            };
            db.record_snapshot(&mut record, latest).unwrap();
            record
        };

        let first = snapshot("s1", true);
        let second = snapshot("s2", false);
        assert!(first.previous_snapshot_id.is_none());
        assert_eq!(second.previous_snapshot_id.as_deref(), Some("s1"));

        let ws = db.workspace("w1").unwrap();
        assert_eq!(ws.latest_snapshot_id.as_deref(), Some("s1"));
        assert_eq!(db.latest_snapshot(&ws).unwrap().unwrap().id, "s1");
        assert_eq!(db.list_snapshots("w1").unwrap().len(), 2);
    }

    #[test]
    fn test_archive_frees_view() {
        let db = seeded();
        db.attach("v1", "w1", true).unwrap();
        db.archive_workspace("w1").unwrap();

        assert!(db.workspace("w1").unwrap().is_archived());
        assert!(db.view("v1").unwrap().workspace_id.is_none());
    }
}
