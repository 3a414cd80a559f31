//! Database connection management.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Database connection shared between engine components.
#[derive(Debug, Clone)]
pub struct Database {
    connection: Arc<std::sync::Mutex<Connection>>,
}

/// Directory holding engine state.
///
/// Priority order:
/// 1. `WSYNC_HOME` environment variable
/// 2. Platform-specific defaults:
///    - Linux: `${XDG_STATE_HOME:-~/.local/state}/wsync`
///    - elsewhere: `<data dir>/wsync`
pub fn default_home() -> crate::Result<PathBuf> {
    if let Ok(home) = std::env::var("WSYNC_HOME") {
        return Ok(PathBuf::from(home));
    }

    #[cfg(target_os = "linux")]
    {
        let state_home = match std::env::var("XDG_STATE_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir()
                .ok_or_else(|| crate::Error::generic("could not determine home directory"))?
                .join(".local")
                .join("state"),
        };
        Ok(state_home.join("wsync"))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| crate::Error::generic("could not determine data directory"))?;
        Ok(data_dir.join("wsync"))
    }
}

impl Database {
    /// Default database location, `<home>/state.db`.
    pub fn default_path() -> crate::Result<PathBuf> {
        Ok(default_home()?.join("state.db"))
    }

    /// Open the database at the default path.
    pub fn open_default() -> crate::Result<Self> {
        let path = Self::default_path()?;
        Self::open(&path)
    }

    /// Open a database at the specified path, creating it and its parent
    /// directory if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            connection: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            connection: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> crate::Result<()> {
        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::MigrationManager::migrate(conn)?;

        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &std::sync::Mutex<Connection> {
        &self.connection
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Connection) -> crate::Result<T>,
    {
        let conn = self.connection.lock().map_err(|e| {
            crate::Error::generic(format!("Failed to acquire database lock: {}", e))
        })?;
        f(&conn)
    }

    /// Execute a transaction with automatic rollback on error.
    pub fn transaction<F, T>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Connection) -> crate::Result<T>,
    {
        let conn = self.connection.lock().map_err(|e| {
            crate::Error::generic(format!("Failed to acquire database lock: {}", e))
        })?;

        let tx = conn.unchecked_transaction()?;
        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }
}
