//! Database migration management.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::schema::SCHEMA_VERSION;

/// Database migration manager.
pub struct MigrationManager;

impl MigrationManager {
    /// Apply all pending migrations to the database.
    pub fn migrate(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        let current_version = Self::current_version(conn)?.unwrap_or(0);
        if current_version > SCHEMA_VERSION {
            return Err(crate::Error::migration(format!(
                "database schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            )));
        }

        if current_version < 1 {
            debug!("applying database migration 1");
            Self::apply_migration_1(conn)?;
        }

        Ok(())
    }

    /// Migration 1: codebases, workspaces, views and the snapshot chain.
    fn apply_migration_1(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS codebases (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                archived_at TEXT
            );

            -- A workspace is a line of work backed by the branch named after its id
            CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                codebase_id TEXT NOT NULL REFERENCES codebases(id) ON DELETE RESTRICT,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                view_id TEXT,
                latest_snapshot_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                archived_at TEXT
            );

            -- One user's working directory for one codebase
            CREATE TABLE IF NOT EXISTS views (
                id TEXT PRIMARY KEY,
                codebase_id TEXT NOT NULL REFERENCES codebases(id) ON DELETE RESTRICT,
                user_id TEXT NOT NULL,
                workspace_id TEXT,
                mount_path TEXT,
                mount_hostname TEXT,
                created_at TEXT NOT NULL,
                last_used_at TEXT
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                codebase_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                view_id TEXT,
                commit_id TEXT NOT NULL,
                action TEXT NOT NULL,
                previous_snapshot_id TEXT REFERENCES snapshots(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_workspaces_codebase ON workspaces(codebase_id);
            CREATE INDEX IF NOT EXISTS idx_workspaces_view ON workspaces(view_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_workspace_created ON snapshots(workspace_id, created_at);

            INSERT OR REPLACE INTO schema_migrations (version) VALUES (1);
            "#,
        )?;

        Ok(())
    }

    /// Get the current schema version.
    pub fn current_version(conn: &Connection) -> crate::Result<Option<u32>> {
        let mut stmt = conn.prepare("SELECT MAX(version) FROM schema_migrations")?;
        let version: Option<u32> = stmt.query_row(params![], |row| row.get(0))?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ALL_TABLES;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&conn).unwrap();
        MigrationManager::migrate(&conn).unwrap();

        assert_eq!(MigrationManager::current_version(&conn).unwrap(), Some(1));

        for table in ALL_TABLES {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_rejects_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&conn).unwrap();
        conn.execute("INSERT INTO schema_migrations (version) VALUES (99)", params![])
            .unwrap();

        let err = MigrationManager::migrate(&conn).unwrap_err();
        assert!(matches!(err, crate::Error::Migration { .. }));
    }
}
