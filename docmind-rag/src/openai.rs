//! OpenAI embedding and generation providers.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::embedding::{EmbeddingMode, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{AnswerOutput, GenerationProvider, GenerationRequest};
use crate::http::{status_error, transport_error};

/// The default OpenAI API base URL.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Transport-level timeout for embedding requests.
const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport-level timeout for generation requests.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

const PROVIDER: &str = "OpenAI";

fn validate_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
    }
    Ok(())
}

async fn error_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// OpenAI encodes documents and queries identically, so both modes send the
/// same request.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::openai::OpenAiEmbeddingProvider;
///
/// let provider = OpenAiEmbeddingProvider::new("sk-...")?;
/// let vectors = provider.embed_documents(&["hello world"]).await?;
/// ```
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddingProvider {
    /// Create a new provider with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        validate_key(&api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
        })
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the provider at an OpenAI-compatible API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn embed(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, ?mode, "embedding batch");

        let request_body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(EMBEDDING_TIMEOUT)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, EMBEDDING_TIMEOUT, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            return Err(status_error(PROVIDER, status, detail, |message| {
                RagError::EmbeddingError { provider: PROVIDER.into(), message }
            }));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts, EmbeddingMode::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text], EmbeddingMode::Query).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }
}

/// A [`GenerationProvider`] backed by OpenAI chat completions with a strict
/// JSON schema for [`AnswerOutput`].
pub struct OpenAiGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OpenAiGenerationProvider {
    /// Create a new provider for `model`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        validate_key(&api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.into(),
            model: model.into(),
            temperature: 0.0,
            max_output_tokens: 2048,
        })
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the output token limit.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Point the provider at an OpenAI-compatible API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_completion_tokens": self.max_output_tokens,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_message },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "answer_output",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "answer": {
                                "type": "string",
                                "description": "The generated answer to the user's question"
                            }
                        },
                        "required": ["answer"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }
}

fn generation_error(message: impl Into<String>) -> RagError {
    RagError::GenerationError { provider: PROVIDER.into(), message: message.into() }
}

#[async_trait]
impl GenerationProvider for OpenAiGenerationProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AnswerOutput> {
        debug!(provider = PROVIDER, model = %self.model, "requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(GENERATION_TIMEOUT)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, GENERATION_TIMEOUT, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            return Err(status_error(PROVIDER, status, detail, generation_error));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| generation_error(format!("failed to parse response: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| generation_error("response contained no message content"))?;

        serde_json::from_str(&content)
            .map_err(|e| generation_error(format!("output does not match answer schema: {e}")))
    }
}
