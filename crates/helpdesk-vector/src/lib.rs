//! Semantic memory: embedding services, a namespaced cosine-similarity
//! index, and the two interchangeable Semantic Memory Store backends
//! (in-process index with snapshot file, remote namespaced index service).

pub mod embedding;
pub mod index;
pub mod memory;
pub mod remote;

pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding, HttpEmbeddingService};
pub use index::{SearchHit, VectorIndex};
pub use memory::{LocalSemanticMemory, SemanticMemory};
pub use remote::RemoteSemanticMemory;
