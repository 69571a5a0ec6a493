//! Per-thread checkpoint persistence.

use std::sync::Arc;

use rusqlite::OptionalExtension;

use helpdesk_core::error::HelpdeskError;
use helpdesk_core::types::Checkpoint;

use crate::db::Database;

/// Stores one JSON-serialized [`Checkpoint`] per thread, overwritten each turn.
#[derive(Debug, Clone)]
pub struct CheckpointRepository {
    db: Arc<Database>,
}

impl CheckpointRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load the latest checkpoint for a thread.
    pub fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, HelpdeskError> {
        let state: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT state FROM checkpoints WHERE thread_id = ?1",
                rusqlite::params![thread_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HelpdeskError::Storage(e.to_string()))
        })?;

        match state {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the checkpoint for its thread.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), HelpdeskError> {
        let json = serde_json::to_string(checkpoint)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (thread_id, user_id, state, turn_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(thread_id) DO UPDATE SET
                     user_id = excluded.user_id,
                     state = excluded.state,
                     turn_count = excluded.turn_count,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    checkpoint.thread_id,
                    checkpoint.user_id,
                    json,
                    checkpoint.turn_count as i64,
                    checkpoint.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| HelpdeskError::Storage(format!("Failed to save checkpoint: {}", e)))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_core::types::Message;

    fn make_repo() -> CheckpointRepository {
        CheckpointRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let repo = make_repo();
        assert!(repo.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let repo = make_repo();
        let mut cp = Checkpoint::empty("user_123", "thread-1");
        cp.summary = "customer reported a cracked screen".to_string();
        cp.messages.push(Message::user("is it covered?"));
        cp.messages.push(Message::assistant("Yes, under warranty."));
        cp.turn_count = 4;
        repo.save(&cp).unwrap();

        let loaded = repo.load("thread-1").unwrap().unwrap();
        assert_eq!(loaded, cp);
    }

    #[test]
    fn test_save_overwrites_previous_state() {
        let repo = make_repo();
        let mut cp = Checkpoint::empty("u", "t");
        repo.save(&cp).unwrap();

        cp.turn_count = 1;
        cp.messages.push(Message::user("second"));
        repo.save(&cp).unwrap();

        let loaded = repo.load("t").unwrap().unwrap();
        assert_eq!(loaded.turn_count, 1);
        assert_eq!(loaded.messages.len(), 1);
    }
}
