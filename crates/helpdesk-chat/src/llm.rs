//! Language Model Service seam and an OpenAI-compatible HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use helpdesk_core::types::Role;

use crate::error::ChatError;

/// One message of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A completion request. `model: None` means the client's default model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl CompletionRequest {
    pub fn new(model: Option<String>, messages: Vec<PromptMessage>) -> Self {
        Self { model, messages }
    }
}

/// Produces text completions. Used for both reply generation and
/// conversation summarization.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError>;
}

/// Client for any service exposing `POST {base}/chat/completions`.
pub struct OpenAiCompatibleClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ChatError::GenerationFailure(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: "llama-3.1-8b-instant".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            temperature: 0.0,
        })
    }

    /// Set the default model, used when a request names none.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, request: &CompletionRequest) -> ChatCompletionBody {
        ChatCompletionBody {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionBody {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        let body = self.build_body(request);
        debug!(model = %body.model, messages = body.messages.len(), "Requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::GenerationFailure(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::GenerationFailure(format!(
                "model service returned {}: {}",
                status, text
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::GenerationFailure(format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::GenerationFailure("response contained no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new("test-key", Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_builder_overrides() {
        let client = client()
            .with_model("gpt-4o-mini")
            .with_base_url("http://localhost:8080/v1/")
            .with_temperature(0.3);
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert!((client.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_body_uses_request_model_when_given() {
        let client = client();
        let request = CompletionRequest::new(
            Some("mixtral-8x7b".into()),
            vec![PromptMessage::system("be brief"), PromptMessage::user("hi")],
        );
        let body = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(body["model"], "mixtral-8x7b");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_body_falls_back_to_default_model() {
        let client = client();
        let request = CompletionRequest::new(None, vec![PromptMessage::user("hi")]);
        let body = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(body["model"], "llama-3.1-8b-instant");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Try a restart."}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Try a restart.")
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_generation_failure() {
        let client = client().with_base_url("http://127.0.0.1:9");
        let request = CompletionRequest::new(None, vec![PromptMessage::user("hi")]);
        let err = client.complete(&request).await.unwrap_err();
        assert!(matches!(err, ChatError::GenerationFailure(_)));
    }
}
