//! In-memory vector index with brute-force cosine similarity search.
//!
//! Entries are partitioned into namespaces (one per user) so a query can
//! never see another user's content. Search is O(n) in the namespace size,
//! which is acceptable for per-user conversation memory.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use helpdesk_core::error::HelpdeskError;

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The ID of the matching vector entry.
    pub id: String,
    /// Cosine similarity score (-1.0 to 1.0).
    pub score: f64,
    /// Metadata associated with the entry.
    pub metadata: Value,
}

/// An entry stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    embedding: Vec<f32>,
    metadata: Value,
}

type Namespaces = HashMap<String, HashMap<String, VectorEntry>>;

/// Namespaced in-memory vector index.
///
/// Thread-safe via interior RwLock; clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    namespaces: Arc<RwLock<Namespaces>>,
}

impl VectorIndex {
    /// Create a new empty vector index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vector with associated metadata into a namespace.
    ///
    /// Overwrites any existing entry with the same ID in that namespace.
    pub fn insert(
        &self,
        namespace: &str,
        id: &str,
        embedding: Vec<f32>,
        metadata: Value,
    ) -> Result<(), HelpdeskError> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|e| HelpdeskError::Memory(format!("Lock poisoned: {}", e)))?;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(id.to_string(), VectorEntry { embedding, metadata });
        Ok(())
    }

    /// Search one namespace for the k nearest neighbors by cosine similarity.
    ///
    /// Returns results sorted by descending similarity score. An unknown
    /// namespace yields no hits.
    pub fn search(
        &self,
        namespace: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, HelpdeskError> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|e| HelpdeskError::Memory(format!("Lock poisoned: {}", e)))?;

        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|(id, entry)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(query, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Total number of vectors across all namespaces.
    pub fn len(&self) -> usize {
        self.namespaces
            .read()
            .map(|n| n.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// Return true if the index contains no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every namespace to a JSON snapshot file.
    ///
    /// Each call writes its own uniquely named temp file in the target's
    /// directory and renames it over the target, so readers only ever see a
    /// complete snapshot. Callers that save concurrently must serialize
    /// saves themselves if they need the newest state to win.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), HelpdeskError> {
        let json = {
            let namespaces = self
                .namespaces
                .read()
                .map_err(|e| HelpdeskError::Memory(format!("Lock poisoned: {}", e)))?;
            serde_json::to_vec(&*namespaces)?
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| HelpdeskError::Io(e.error))?;
        Ok(())
    }

    /// Load an index from a snapshot file. A missing file yields an empty index.
    pub fn load_snapshot(path: &Path) -> Result<Self, HelpdeskError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        let namespaces: Namespaces = serde_json::from_slice(&bytes)?;
        let index = Self {
            namespaces: Arc::new(RwLock::new(namespaces)),
        };
        info!(
            path = %path.display(),
            vectors = index.len(),
            "Loaded semantic memory snapshot"
        );
        Ok(index)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
