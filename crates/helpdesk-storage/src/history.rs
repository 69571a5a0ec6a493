//! Relational message history, scoped per `(user_id, thread_id)`.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use helpdesk_core::error::HelpdeskError;
use helpdesk_core::types::{Role, StoredMessage};

use crate::db::Database;

/// Repository for the users / conversations / messages tables.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    db: Arc<Database>,
}

impl HistoryRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message to a thread and return its id.
    ///
    /// Creates the user and conversation rows on first use. A fresh UUIDv4
    /// is generated when `message_id` is `None`.
    pub fn append(
        &self,
        user_id: &str,
        thread_id: &str,
        role: Role,
        content: &str,
        message_id: Option<&str>,
    ) -> Result<String, HelpdeskError> {
        let message_id = message_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = Utc::now().timestamp_millis();

        self.db.with_transaction(|tx| {
            ensure_conversation_rows(tx, user_id, thread_id)?;
            tx.execute(
                "INSERT INTO messages (message_id, thread_id, user_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![message_id, thread_id, user_id, role.as_str(), content, timestamp],
            )
            .map_err(|e| HelpdeskError::Storage(format!("Failed to save message: {}", e)))?;
            Ok(())
        })?;

        Ok(message_id)
    }

    /// Load the most recent `limit` messages of a thread, oldest first.
    pub fn load_recent(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, HelpdeskError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT message_id, role, content, timestamp FROM (
                         SELECT message_id, role, content, timestamp, rowid AS seq
                         FROM messages
                         WHERE user_id = ?1 AND thread_id = ?2
                         ORDER BY timestamp DESC, seq DESC
                         LIMIT ?3
                     )
                     ORDER BY timestamp ASC, seq ASC",
                )
                .map_err(|e| HelpdeskError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, thread_id, limit as i64], |row| {
                    Ok(row_to_stored_message(row))
                })
                .map_err(|e| HelpdeskError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let message = row.map_err(|e| HelpdeskError::Storage(e.to_string()))??;
                messages.push(message);
            }
            Ok(messages)
        })
    }

    /// Count messages stored for a thread.
    pub fn count(&self, user_id: &str, thread_id: &str) -> Result<u64, HelpdeskError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE user_id = ?1 AND thread_id = ?2",
                    rusqlite::params![user_id, thread_id],
                    |row| row.get(0),
                )
                .map_err(|e| HelpdeskError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

/// Create the user and conversation rows if missing. A thread keeps the user
/// it was first created for.
fn ensure_conversation_rows(
    conn: &Connection,
    user_id: &str,
    thread_id: &str,
) -> Result<(), HelpdeskError> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id) VALUES (?1)",
        rusqlite::params![user_id],
    )
    .map_err(|e| HelpdeskError::Storage(format!("Failed to create user: {}", e)))?;
    conn.execute(
        "INSERT OR IGNORE INTO conversations (thread_id, user_id) VALUES (?1, ?2)",
        rusqlite::params![thread_id, user_id],
    )
    .map_err(|e| HelpdeskError::Storage(format!("Failed to create conversation: {}", e)))?;
    Ok(())
}

fn row_to_stored_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, HelpdeskError> {
    let message_id: String = row
        .get(0)
        .map_err(|e| HelpdeskError::Storage(e.to_string()))?;
    let role: String = row
        .get(1)
        .map_err(|e| HelpdeskError::Storage(e.to_string()))?;
    let content: String = row
        .get(2)
        .map_err(|e| HelpdeskError::Storage(e.to_string()))?;
    let timestamp_ms: i64 = row
        .get(3)
        .map_err(|e| HelpdeskError::Storage(e.to_string()))?;

    Ok(StoredMessage {
        message_id,
        role: role.parse()?,
        content,
        timestamp: Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| HelpdeskError::Storage(format!("Invalid timestamp: {}", timestamp_ms)))?,
    })
}
