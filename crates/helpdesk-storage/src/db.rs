//! SQLite handle shared by the history and checkpoint repositories.
//!
//! Every repository call runs on a blocking task and borrows the single
//! connection for the length of one statement batch.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use helpdesk_core::error::HelpdeskError;

use crate::migrations;

/// The support store's SQLite file: message history plus thread checkpoints.
///
/// Opened once by the binary and handed to both repositories behind an
/// `Arc`. File databases run in WAL mode so checkpoint writes from one thread
/// do not block history reads for another.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the store at `path`, creating parent directories and applying
    /// any schema versions the file has not seen yet.
    pub fn new(path: &Path) -> Result<Self, HelpdeskError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            HelpdeskError::Storage(format!("Cannot open support store {}: {}", path.display(), e))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| HelpdeskError::Storage(format!("Cannot configure support store: {}", e)))?;

        let db = Self::migrated(conn)?;
        info!(path = %path.display(), "Support store ready");
        Ok(db)
    }

    /// Throwaway store for tests and dry runs.
    pub fn in_memory() -> Result<Self, HelpdeskError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| HelpdeskError::Storage(format!("Cannot open in-memory store: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| HelpdeskError::Storage(format!("Cannot configure support store: {}", e)))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, HelpdeskError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run read or single-statement work against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, HelpdeskError>
    where
        F: FnOnce(&Connection) -> Result<T, HelpdeskError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| HelpdeskError::Storage(format!("Support store lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run `f` in one transaction: committed on `Ok`, rolled back otherwise.
    /// History appends use this so a message never lands without its
    /// conversation row.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, HelpdeskError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, HelpdeskError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| HelpdeskError::Storage(format!("Support store lock poisoned: {}", e)))?;
        let tx = conn
            .transaction()
            .map_err(|e| HelpdeskError::Storage(format!("Cannot begin transaction: {}", e)))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| HelpdeskError::Storage(format!("Cannot commit transaction: {}", e)))?;
        Ok(value)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
