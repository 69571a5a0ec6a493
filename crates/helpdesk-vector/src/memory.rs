//! Semantic Memory Store seam and the in-process backend.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{MemoryHit, Role};

use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;

/// Nearest-neighbor recall over past conversation content, namespaced per user.
#[async_trait]
pub trait SemanticMemory: Send + Sync {
    /// Store (or replace) one message in the user's namespace.
    async fn upsert(&self, user_id: &str, message_id: &str, content: &str, role: Role)
        -> Result<()>;

    /// Up to `top_k` closest past messages for `query_text`, best first.
    async fn query(&self, user_id: &str, query_text: &str, top_k: usize) -> Result<Vec<MemoryHit>>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Metadata payload stored alongside each vector.
pub(crate) fn hit_metadata(content: &str, role: Role) -> Value {
    json!({ "role": role.as_str(), "content": content })
}

/// Decode the `{role, content}` metadata written by [`hit_metadata`].
pub(crate) fn hit_from_metadata(metadata: &Value, score: f64) -> Option<MemoryHit> {
    let role = metadata.get("role")?.as_str()?.parse().ok()?;
    let content = metadata.get("content")?.as_str()?.to_string();
    Some(MemoryHit {
        role,
        content,
        score,
    })
}

/// In-process backend: a [`VectorIndex`] with an optional JSON snapshot file.
///
/// The snapshot is rewritten after every upsert so recall survives restarts.
/// Rewrites are serialized, so the file on disk always trails the index by
/// at most the upserts still waiting to persist.
pub struct LocalSemanticMemory {
    index: VectorIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    snapshot: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl LocalSemanticMemory {
    /// Purely in-memory store.
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self {
            index: VectorIndex::new(),
            embedder,
            snapshot: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Store backed by a snapshot file, loading it if present.
    pub fn with_snapshot(
        embedder: Arc<dyn DynEmbeddingService>,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let path = path.into();
        let index = VectorIndex::load_snapshot(&path)?;
        Ok(Self {
            index,
            embedder,
            snapshot: Some(path),
            persist_lock: Mutex::new(()),
        })
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = self.snapshot.clone() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let index = self.index.clone();
        tokio::task::spawn_blocking(move || index.save_snapshot(&path))
            .await
            .map_err(|e| HelpdeskError::Memory(format!("Snapshot task failed: {}", e)))?
    }
}

#[async_trait]
impl SemanticMemory for LocalSemanticMemory {
    async fn upsert(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
        role: Role,
    ) -> Result<()> {
        let embedding = self.embedder.embed_boxed(content).await?;
        self.index
            .insert(user_id, message_id, embedding, hit_metadata(content, role))?;
        debug!(user_id, message_id, "Upserted message into local memory");
        self.persist().await
    }

    async fn query(&self, user_id: &str, query_text: &str, top_k: usize) -> Result<Vec<MemoryHit>> {
        let embedding = self.embedder.embed_boxed(query_text).await?;
        let hits = self.index.search(user_id, &embedding, top_k)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let decoded = hit_from_metadata(&hit.metadata, hit.score);
                if decoded.is_none() {
                    warn!(id = %hit.id, "Skipping memory entry with malformed metadata");
                }
                decoded
            })
            .collect())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;

    fn embedder() -> Arc<dyn DynEmbeddingService> {
        Arc::new(HashEmbedding::default())
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let memory = LocalSemanticMemory::new(embedder());
        memory
            .upsert("u", "m1", "my laptop battery drains overnight", Role::User)
            .await
            .unwrap();
        memory
            .upsert("u", "m2", "how do I update my billing address", Role::User)
            .await
            .unwrap();

        let hits = memory.query("u", "battery drains quickly", 3).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "my laptop battery drains overnight");
        assert_eq!(hits[0].role, Role::User);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_query_is_namespaced_per_user() {
        let memory = LocalSemanticMemory::new(embedder());
        memory
            .upsert("alice", "m1", "order 1234 arrived damaged", Role::User)
            .await
            .unwrap();

        assert!(memory.query("bob", "order damaged", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_respects_top_k() {
        let memory = LocalSemanticMemory::new(embedder());
        for i in 0..6 {
            memory
                .upsert("u", &format!("m{}", i), &format!("printer issue {}", i), Role::User)
                .await
                .unwrap();
        }
        assert_eq!(memory.query("u", "printer", 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        {
            let memory = LocalSemanticMemory::with_snapshot(embedder(), &path).unwrap();
            memory
                .upsert("u", "m1", "router keeps rebooting", Role::Assistant)
                .await
                .unwrap();
        }

        let reopened = LocalSemanticMemory::with_snapshot(embedder(), &path).unwrap();
        let hits = reopened.query("u", "router rebooting", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].role, Role::Assistant);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_upserts_keep_snapshot_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = Arc::new(LocalSemanticMemory::with_snapshot(embedder(), &path).unwrap());

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let memory = memory.clone();
                tokio::spawn(async move {
                    memory
                        .upsert(
                            &format!("user{}", i % 4),
                            &format!("m{}", i),
                            &format!("device {} keeps restarting", i),
                            Role::User,
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reopened = LocalSemanticMemory::with_snapshot(embedder(), &path).unwrap();
        assert_eq!(reopened.index.len(), 64);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_metadata_decoding() {
        let meta = hit_metadata("hello", Role::User);
        let hit = hit_from_metadata(&meta, 0.5).unwrap();
        assert_eq!(hit.content, "hello");
        assert!(hit_from_metadata(&json!({"role": "robot", "content": "x"}), 0.1).is_none());
        assert!(hit_from_metadata(&json!({}), 0.1).is_none());
    }
}
