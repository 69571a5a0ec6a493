//! Async store seams consumed by the dialogue orchestrator.
//!
//! The SQLite implementations run each call on tokio's blocking pool so a
//! slow disk never stalls the async runtime; callers wrap them in their own
//! timeouts.

use std::sync::Arc;

use async_trait::async_trait;

use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{Checkpoint, Role, StoredMessage};

use crate::checkpoint::CheckpointRepository;
use crate::db::Database;
use crate::history::HistoryRepository;

/// Durable per-user, per-thread message log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent `limit` messages for the thread, oldest first.
    async fn load_recent(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>>;

    /// Append a message and return its generated id.
    async fn append(
        &self,
        user_id: &str,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<String>;
}

/// Durable snapshot of conversation state, one per thread.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
}

/// [`HistoryStore`] backed by the shared SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    repo: HistoryRepository,
}

impl SqliteHistoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            repo: HistoryRepository::new(db),
        }
    }

    pub fn repository(&self) -> &HistoryRepository {
        &self.repo
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load_recent(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let repo = self.repo.clone();
        let user_id = user_id.to_string();
        let thread_id = thread_id.to_string();
        blocking(move || repo.load_recent(&user_id, &thread_id, limit)).await
    }

    async fn append(
        &self,
        user_id: &str,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<String> {
        let repo = self.repo.clone();
        let user_id = user_id.to_string();
        let thread_id = thread_id.to_string();
        let content = content.to_string();
        blocking(move || repo.append(&user_id, &thread_id, role, &content, None)).await
    }
}

/// [`CheckpointStore`] backed by the shared SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    repo: CheckpointRepository,
}

impl SqliteCheckpointStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            repo: CheckpointRepository::new(db),
        }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let repo = self.repo.clone();
        let thread_id = thread_id.to_string();
        blocking(move || repo.load(&thread_id)).await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let repo = self.repo.clone();
        let checkpoint = checkpoint.clone();
        blocking(move || repo.save(&checkpoint)).await
    }
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HelpdeskError::Storage(format!("Storage task failed: {}", e)))?
}
