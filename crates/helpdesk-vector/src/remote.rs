//! Remote namespaced vector index backend.
//!
//! Speaks the common hosted-index dialect: `POST {base}/vectors/upsert` and
//! `POST {base}/query`, each carrying a `namespace`, authenticated with an
//! `Api-Key` header. Embeddings are computed client-side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{MemoryHit, Role};

use crate::embedding::DynEmbeddingService;
use crate::memory::{hit_from_metadata, hit_metadata, SemanticMemory};

/// [`SemanticMemory`] backed by a hosted vector index, one namespace per user.
pub struct RemoteSemanticMemory {
    client: Client,
    base_url: String,
    api_key: String,
    embedder: Arc<dyn DynEmbeddingService>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: Vec<f32>,
    metadata: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RemoteSemanticMemory {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        embedder: Arc<dyn DynEmbeddingService>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HelpdeskError::Remote(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedder,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| HelpdeskError::Remote(format!("Vector index request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HelpdeskError::Remote(format!(
                "Vector index returned {} for {}: {}",
                status, path, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl SemanticMemory for RemoteSemanticMemory {
    async fn upsert(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
        role: Role,
    ) -> Result<()> {
        let values = self.embedder.embed_boxed(content).await?;
        let request = UpsertRequest {
            vectors: vec![UpsertVector {
                id: message_id,
                values,
                metadata: hit_metadata(content, role),
            }],
            namespace: user_id,
        };
        self.post("/vectors/upsert", &request).await?;
        debug!(user_id, message_id, "Upserted message into remote index");
        Ok(())
    }

    async fn query(&self, user_id: &str, query_text: &str, top_k: usize) -> Result<Vec<MemoryHit>> {
        let vector = self.embedder.embed_boxed(query_text).await?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: user_id,
        };
        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .map_err(|e| HelpdeskError::Remote(format!("Invalid query response: {}", e)))?;

        Ok(response
            .matches
            .iter()
            .filter_map(|m| {
                m.metadata
                    .as_ref()
                    .and_then(|meta| hit_from_metadata(meta, m.score))
            })
            .collect())
    }

    fn backend(&self) -> &'static str {
        "remote"
    }
}
