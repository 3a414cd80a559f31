//! Database models and persistence operations.

use chrono::SecondsFormat;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Current time as an RFC 3339 timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Database model for codebases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebaseRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub archived_at: Option<String>,
}

/// Database model for workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub codebase_id: String,
    pub user_id: String,
    pub name: String,
    /// View currently hosting the live working directory.
    pub view_id: Option<String>,
    pub latest_snapshot_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub archived_at: Option<String>,
}

impl WorkspaceRecord {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Database model for views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub id: String,
    pub codebase_id: String,
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub mount_path: Option<String>,
    pub mount_hostname: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

/// Database model for snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub codebase_id: String,
    pub workspace_id: String,
    pub view_id: Option<String>,
    pub commit_id: String,
    pub action: String,
    /// The workspace's latest snapshot when this one was taken.
    pub previous_snapshot_id: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

const CODEBASE_COLUMNS: &str = "id, name, created_at, archived_at";

impl CodebaseRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
            archived_at: row.get(3)?,
        })
    }
}

/// Database operations for codebases.
pub struct CodebaseStore<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> CodebaseStore<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &CodebaseRecord) -> crate::Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO codebases (id, name, created_at, archived_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![record.id, record.name, record.created_at, record.archived_at],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> crate::Result<Option<CodebaseRecord>> {
        let sql = format!("SELECT {} FROM codebases WHERE id = ?", CODEBASE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], CodebaseRecord::from_row)
            .optional()?)
    }
}

const WORKSPACE_COLUMNS: &str = "id, codebase_id, user_id, name, view_id, latest_snapshot_id, \
                                 created_at, updated_at, archived_at";

impl WorkspaceRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            codebase_id: row.get(1)?,
            user_id: row.get(2)?,
            name: row.get(3)?,
            view_id: row.get(4)?,
            latest_snapshot_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            archived_at: row.get(8)?,
        })
    }
}

/// Database operations for workspaces.
pub struct WorkspaceStore<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> WorkspaceStore<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &WorkspaceRecord) -> crate::Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO workspaces (id, codebase_id, user_id, name, view_id, latest_snapshot_id, created_at, updated_at, archived_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.id,
                record.codebase_id,
                record.user_id,
                record.name,
                record.view_id,
                record.latest_snapshot_id,
                record.created_at,
                record.updated_at,
                record.archived_at
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> crate::Result<Option<WorkspaceRecord>> {
        let sql = format!("SELECT {} FROM workspaces WHERE id = ?", WORKSPACE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], WorkspaceRecord::from_row)
            .optional()?)
    }

    /// The workspace whose live working directory is on `view_id`.
    pub fn get_by_view_id(&self, view_id: &str) -> crate::Result<Option<WorkspaceRecord>> {
        let sql = format!(
            "SELECT {} FROM workspaces WHERE view_id = ? AND archived_at IS NULL",
            WORKSPACE_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![view_id], WorkspaceRecord::from_row)
            .optional()?)
    }

    pub fn list_by_codebase(&self, codebase_id: &str) -> crate::Result<Vec<WorkspaceRecord>> {
        let sql = format!(
            "SELECT {} FROM workspaces WHERE codebase_id = ? ORDER BY created_at, rowid",
            WORKSPACE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![codebase_id], WorkspaceRecord::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn set_view_id(&self, id: &str, view_id: Option<&str>) -> crate::Result<()> {
        self.update_one(
            "UPDATE workspaces SET view_id = ? WHERE id = ?",
            params![view_id, id],
            id,
        )
    }

    pub fn set_latest_snapshot_id(&self, id: &str, snapshot_id: &str) -> crate::Result<()> {
        self.update_one(
            "UPDATE workspaces SET latest_snapshot_id = ? WHERE id = ?",
            params![snapshot_id, id],
            id,
        )
    }

    /// Record that the workspace's content changed.
    pub fn mark_updated(&self, id: &str) -> crate::Result<()> {
        self.update_one(
            "UPDATE workspaces SET updated_at = ? WHERE id = ?",
            params![now_timestamp(), id],
            id,
        )
    }

    pub fn archive(&self, id: &str) -> crate::Result<()> {
        self.update_one(
            "UPDATE workspaces SET archived_at = COALESCE(archived_at, ?), view_id = NULL WHERE id = ?",
            params![now_timestamp(), id],
            id,
        )
    }

    fn update_one(&self, sql: &str, params: &[&dyn rusqlite::ToSql], id: &str) -> crate::Result<()> {
        let changed = self.conn.execute(sql, params)?;
        if changed == 0 {
            return Err(crate::Error::generic(format!("workspace {} not found", id)));
        }
        Ok(())
    }
}

const VIEW_COLUMNS: &str =
    "id, codebase_id, user_id, workspace_id, mount_path, mount_hostname, created_at, last_used_at";

impl ViewRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            codebase_id: row.get(1)?,
            user_id: row.get(2)?,
            workspace_id: row.get(3)?,
            mount_path: row.get(4)?,
            mount_hostname: row.get(5)?,
            created_at: row.get(6)?,
            last_used_at: row.get(7)?,
        })
    }
}

/// Database operations for views.
pub struct ViewStore<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> ViewStore<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &ViewRecord) -> crate::Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO views (id, codebase_id, user_id, workspace_id, mount_path, mount_hostname, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.id,
                record.codebase_id,
                record.user_id,
                record.workspace_id,
                record.mount_path,
                record.mount_hostname,
                record.created_at,
                record.last_used_at
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> crate::Result<Option<ViewRecord>> {
        let sql = format!("SELECT {} FROM views WHERE id = ?", VIEW_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], ViewRecord::from_row)
            .optional()?)
    }

    pub fn set_workspace_id(&self, id: &str, workspace_id: Option<&str>) -> crate::Result<()> {
        let changed = self.conn.execute(
            "UPDATE views SET workspace_id = ? WHERE id = ?",
            params![workspace_id, id],
        )?;
        if changed == 0 {
            return Err(crate::Error::generic(format!("view {} not found", id)));
        }
        Ok(())
    }

    pub fn touch(&self, id: &str) -> crate::Result<()> {
        self.conn.execute(
            "UPDATE views SET last_used_at = ? WHERE id = ?",
            params![now_timestamp(), id],
        )?;
        Ok(())
    }
}

const SNAPSHOT_COLUMNS: &str = "id, codebase_id, workspace_id, view_id, commit_id, action, \
                                previous_snapshot_id, created_at, deleted_at";

impl SnapshotRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            codebase_id: row.get(1)?,
            workspace_id: row.get(2)?,
            view_id: row.get(3)?,
            commit_id: row.get(4)?,
            action: row.get(5)?,
            previous_snapshot_id: row.get(6)?,
            created_at: row.get(7)?,
            deleted_at: row.get(8)?,
        })
    }
}

/// Database operations for snapshots. Rows are never updated after insert.
pub struct SnapshotStore<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &SnapshotRecord) -> crate::Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO snapshots (id, codebase_id, workspace_id, view_id, commit_id, action, previous_snapshot_id, created_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.id,
                record.codebase_id,
                record.workspace_id,
                record.view_id,
                record.commit_id,
                record.action,
                record.previous_snapshot_id,
                record.created_at,
                record.deleted_at
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> crate::Result<Option<SnapshotRecord>> {
        let sql = format!("SELECT {} FROM snapshots WHERE id = ?", SNAPSHOT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], SnapshotRecord::from_row)
            .optional()?)
    }

    /// Most recently taken live snapshot of a workspace.
    pub fn latest_in_workspace(&self, workspace_id: &str) -> crate::Result<Option<SnapshotRecord>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE workspace_id = ? AND deleted_at IS NULL \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![workspace_id], SnapshotRecord::from_row)
            .optional()?)
    }

    /// Live snapshots of a workspace, oldest first.
    pub fn list_by_workspace(&self, workspace_id: &str) -> crate::Result<Vec<SnapshotRecord>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE workspace_id = ? AND deleted_at IS NULL \
             ORDER BY created_at, rowid",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![workspace_id], SnapshotRecord::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
