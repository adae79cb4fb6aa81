//! Gemini embedding and generation providers over the Generative Language
//! REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::embedding::{EmbeddingMode, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{AnswerOutput, GenerationProvider, GenerationRequest};
use crate::http::{status_error, transport_error};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport-level timeout for generation requests.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

const PROVIDER: &str = "Gemini";

fn validate_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(RagError::ConfigError("Gemini API key must not be empty".into()));
    }
    Ok(())
}

async fn error_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

impl EmbeddingMode {
    fn task_type(self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Documents are embedded with the `RETRIEVAL_DOCUMENT` task type and
/// questions with `RETRIEVAL_QUERY`.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new("your-api-key")?;
/// let embedding = provider.embed_query("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    output_dimensionality: Option<u32>,
}

impl GeminiEmbeddingProvider {
    /// Create a new provider using the given API key and the default
    /// `gemini-embedding-001` model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        validate_key(&api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_API_BASE.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            output_dimensionality: None,
        })
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Truncate output vectors to `dims` values.
    pub fn with_output_dimensionality(mut self, dims: u32) -> Self {
        self.output_dimensionality = Some(dims);
        self
    }

    fn request_body<'a>(&'a self, texts: &[&'a str], mode: EmbeddingMode) -> BatchEmbedRequest<'a> {
        let model = format!("models/{}", self.model);
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|&text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content { parts: vec![Part { text }] },
                    task_type: mode.task_type(),
                    output_dimensionality: self.output_dimensionality,
                })
                .collect(),
        }
    }

    async fn embed(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, ?mode, "embedding batch");

        let response = self
            .client
            .post(format!("{}/models/{}:batchEmbedContents", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(EMBEDDING_TIMEOUT)
            .json(&self.request_body(texts, mode))
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

        let batch: BatchEmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        Ok(batch.embeddings.into_iter().map(|e| e.values).collect())
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
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
impl EmbeddingProvider for GeminiEmbeddingProvider {
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

/// A [`GenerationProvider`] backed by Gemini `generateContent` in JSON mode
/// with a response schema for [`AnswerOutput`].
pub struct GeminiGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiGenerationProvider {
    /// Create a new provider for `model` (e.g. `gemini-2.5-flash`).
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        validate_key(&api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_API_BASE.into(),
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

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": [
                { "role": "user", "parts": [{ "text": request.user_message }] }
            ],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "answer": {
                            "type": "STRING",
                            "description": "The generated answer to the user's question"
                        }
                    },
                    "required": ["answer"]
                }
            }
        })
    }
}

fn generation_error(message: impl Into<String>) -> RagError {
    RagError::GenerationError { provider: PROVIDER.into(), message: message.into() }
}

#[async_trait]
impl GenerationProvider for GeminiGenerationProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AnswerOutput> {
        debug!(provider = PROVIDER, model = %self.model, "requesting content");

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
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

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| generation_error(format!("failed to parse response: {e}")))?;

        let text: String = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(generation_error("response contained no candidate text"));
        }

        serde_json::from_str(&text)
            .map_err(|e| generation_error(format!("output does not match answer schema: {e}")))
    }
}
