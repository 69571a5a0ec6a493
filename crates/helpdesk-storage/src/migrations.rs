//! Database schema migrations.
//!
//! Applies the conversation schema: users, conversations, messages,
//! checkpoints, and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use helpdesk_core::error::HelpdeskError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HelpdeskError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| HelpdeskError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = current_version(conn)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: conversation_schema");
    }

    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: checkpoints");
    }

    Ok(())
}

/// Highest applied migration version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, HelpdeskError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| HelpdeskError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: users, conversations, and the message log.
fn apply_v1(conn: &Connection) -> Result<(), HelpdeskError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id     TEXT PRIMARY KEY NOT NULL,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            thread_id   TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL REFERENCES users(user_id),
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_user
            ON conversations (user_id);

        -- timestamp is epoch milliseconds; rowid breaks ties in arrival order.
        CREATE TABLE IF NOT EXISTS messages (
            message_id  TEXT PRIMARY KEY NOT NULL,
            thread_id   TEXT NOT NULL REFERENCES conversations(thread_id),
            user_id     TEXT NOT NULL REFERENCES users(user_id),
            role        TEXT NOT NULL
                        CHECK (role IN ('user', 'assistant', 'system')),
            content     TEXT NOT NULL,
            timestamp   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages (user_id, thread_id, timestamp DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'conversation_schema');
        ",
    )
    .map_err(|e| HelpdeskError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

/// Version 2: per-thread session checkpoints.
fn apply_v2(conn: &Connection) -> Result<(), HelpdeskError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id   TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            state       TEXT NOT NULL,
            turn_count  INTEGER NOT NULL DEFAULT 0,
            updated_at  INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (2, 'checkpoints');
        ",
    )
    .map_err(|e| HelpdeskError::Storage(format!("Migration v2 failed: {}", e)))?;

    Ok(())
}
