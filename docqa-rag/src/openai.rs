//! OpenAI-backed embedding and chat completion providers.
//!
//! This module is only available when the `openai` feature is enabled.
//! Both providers read `OPENAI_API_KEY` in `from_env` and honor
//! `OPENAI_BASE_URL` for compatible gateways.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::completion::CompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

const PROVIDER: &str = "OpenAI";

/// Connection settings shared by both providers.
#[derive(Clone)]
struct Connection {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Connection {
    fn new(api_key: String, request_timeout: Duration) -> std::result::Result<Self, String> {
        if api_key.trim().is_empty() {
            return Err("API key must not be empty".into());
        }
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self { client, api_key, base_url })
    }

    fn api_key_from_env() -> std::result::Result<String, String> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY environment variable not set".to_string())
    }

    /// POST `body` to `path` and decode the JSON reply. Errors are plain
    /// messages so each provider can wrap them in its own variant.
    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, url = %url, error = %e, "request failed");
                format!("request failed: {e}")
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, url = %url, %status, "API error");
            return Err(format!("API returned {status}: {detail}"));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            format!("failed to parse response: {e}")
        })
    }
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("notice period").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    connection: Connection,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message }
}

impl OpenAIEmbeddingProvider {
    /// Create a provider with the given API key, the `text-embedding-3-small`
    /// model and a 60 second request timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let connection =
            Connection::new(api_key.into(), Duration::from_secs(60)).map_err(embedding_error)?;
        Ok(Self {
            connection,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(Connection::api_key_from_env().map_err(embedding_error)?)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    ///
    /// Pair a non-default model with [`with_dimensions`](Self::with_dimensions)
    /// so the declared dimension matches what the model returns.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request embeddings truncated to `dims` and declare that dimension.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let mut response: EmbeddingResponse =
            self.connection.post("embeddings", &request).await.map_err(embedding_error)?;

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`CompletionProvider`] backed by the OpenAI chat completions API.
///
/// Sends the prompt as a single user message. Defaults to `gpt-3.5-turbo`
/// at temperature 0.
pub struct OpenAICompletionProvider {
    connection: Connection,
    model: String,
    temperature: f32,
}

fn synthesis_error(message: String) -> RagError {
    RagError::SynthesisError { provider: PROVIDER.into(), message }
}

impl OpenAICompletionProvider {
    /// Create a provider with the given API key.
    ///
    /// The HTTP timeout is generous; the synthesizer applies the configured
    /// completion timeout on top of it.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let connection =
            Connection::new(api_key.into(), Duration::from_secs(300)).map_err(synthesis_error)?;
        Ok(Self { connection, model: DEFAULT_CHAT_MODEL.into(), temperature: 0.0 })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(Connection::api_key_from_env().map_err(synthesis_error)?)
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAICompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.len(),
            "chat completion"
        );

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage { role: "user", content: prompt }],
        };
        let response: ChatResponse =
            self.connection.post("chat/completions", &request).await.map_err(synthesis_error)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| synthesis_error("API returned no completion".into()))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ── Shared response types ──────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            OpenAIEmbeddingProvider::new(""),
            Err(RagError::EmbeddingError { provider, .. }) if provider == PROVIDER
        ));
        assert!(matches!(
            OpenAICompletionProvider::new("  "),
            Err(RagError::SynthesisError { .. })
        ));
    }

    #[test]
    fn with_dimensions_updates_declared_size() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_dimensions(256);
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.request_dimensions, Some(256));
    }

    #[test]
    fn chat_request_serializes_single_user_message() {
        let request = ChatRequest {
            model: DEFAULT_CHAT_MODEL,
            temperature: 0.0,
            messages: [ChatMessage { role: "user", content: "hi" }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn embedding_response_is_reordered_by_index() {
        let body = r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#;
        let mut response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        response.data.sort_by_key(|d| d.index);
        assert_eq!(response.data[0].embedding, vec![1.0]);
    }
}
