//! Embedding service trait and implementations.
//!
//! - `HttpEmbeddingService` calls an OpenAI-compatible `/embeddings`
//!   endpoint. This is the production embedding backend.
//! - `HashEmbedding` is a deterministic feature-hashing embedder: texts that
//!   share words land near each other, which is enough for offline use and
//!   for tests.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use helpdesk_core::error::HelpdeskError;

/// Service for generating text embeddings.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, HelpdeskError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future`, which is not
/// object-safe. This trait boxes the future so memory backends can hold an
/// `Arc<dyn DynEmbeddingService>` chosen at runtime from configuration.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, HelpdeskError>> + Send + 'a>,
    >;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, HelpdeskError>> + Send + 'a>,
    > {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// HttpEmbeddingService
// ---------------------------------------------------------------------------

/// OpenAI-compatible embeddings client.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbeddingService {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, HelpdeskError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HelpdeskError::Embedding(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        })
    }
}

impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HelpdeskError> {
        if text.trim().is_empty() {
            return Err(HelpdeskError::Embedding("Cannot embed empty text".to_string()));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
            dimensions: Some(self.dimensions),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| HelpdeskError::Embedding(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HelpdeskError::Embedding(format!(
                "Embedding endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| HelpdeskError::Embedding(format!("Invalid embedding response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| HelpdeskError::Embedding("No embedding returned".to_string()))?;

        debug!(dimensions = embedding.len(), "Embedded text remotely");
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Each lowercase alphanumeric token is hashed (FNV-1a, stable across
/// builds) into one bucket with a +/-1 sign; the result is L2-normalized.
/// Identical inputs always produce identical vectors and snapshot files
/// stay valid between releases.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            result[bucket] += sign;
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HelpdeskError> {
        if text.trim().is_empty() {
            return Err(HelpdeskError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
