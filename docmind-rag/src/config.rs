//! Configuration for the RAG pipeline and its model providers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "documents";

/// Default directory for collection artifacts.
pub const DEFAULT_STORE_PATH: &str = "database/vector_store";

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in words.
    pub chunk_size: usize,
    /// Number of words shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results retrieved per question.
    pub top_k: usize,
    /// Collection the pipeline reads and writes.
    pub collection: String,
    /// Directory holding collection artifacts.
    pub store_path: PathBuf,
    /// Retry behaviour for generation calls.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 5,
            collection: DEFAULT_COLLECTION.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from `VECTOR_STORE_PATH`, `VECTOR_COLLECTION_NAME`
    /// and `DOCUMENT_CHUNK_SIZE`, falling back to defaults. The overlap is 10%
    /// of the chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `DOCUMENT_CHUNK_SIZE` is not a
    /// positive integer or the result fails validation.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Ok(path) = std::env::var("VECTOR_STORE_PATH") {
            builder = builder.store_path(path);
        }
        if let Ok(collection) = std::env::var("VECTOR_COLLECTION_NAME") {
            builder = builder.collection(collection);
        }
        if let Ok(size) = std::env::var("DOCUMENT_CHUNK_SIZE") {
            let size: usize = size.trim().parse().map_err(|_| {
                RagError::ConfigError(format!("DOCUMENT_CHUNK_SIZE must be an integer, got '{size}'"))
            })?;
            builder = builder.chunk_size(size).chunk_overlap(size / 10);
        }
        builder.build()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in words.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in words.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the artifact directory.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = path.into();
        self
    }

    /// Set the retry policy for generation calls.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `collection` is empty
    /// - the retry policy is invalid
    pub fn build(self) -> Result<RagConfig> {
        if self.config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.config.chunk_overlap >= self.config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.config.chunk_overlap, self.config.chunk_size
            )));
        }
        if self.config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.config.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection must not be empty".to_string()));
        }
        self.config.retry.validate()?;
        Ok(self.config)
    }
}

/// The model backends the pipeline can be wired to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI embeddings and chat completions.
    OpenAi,
    /// Google Gemini embeddings and content generation.
    Gemini,
}

impl std::str::FromStr for ProviderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" | "google-gla" => Ok(Self::Gemini),
            other => Err(RagError::ConfigError(format!("unsupported provider: '{other}'"))),
        }
    }
}

impl ProviderKind {
    /// Default embedding model for this backend.
    pub fn default_embedding_model(self) -> &'static str {
        match self {
            Self::OpenAi => "text-embedding-3-small",
            Self::Gemini => "gemini-embedding-001",
        }
    }

    /// Default generation model for this backend.
    pub fn default_generation_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-2.5-flash",
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
        }
    }
}

/// Which backend to use and how to reach it.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    /// The backend.
    pub kind: ProviderKind,
    /// API key for the backend.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Generation model name.
    pub generation_model: String,
    /// Sampling temperature for generation.
    pub temperature: f32,
    /// Output token limit for generation.
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl ProviderSettings {
    /// Settings for `kind` with its default models.
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            embedding_model: kind.default_embedding_model().to_string(),
            generation_model: kind.default_generation_model().to_string(),
            temperature: 0.0,
            max_output_tokens: 2048,
        }
    }

    /// Read settings from the environment.
    ///
    /// `AI_PROVIDER` selects the backend (`openai` or `gemini`, default
    /// `gemini`). Model names come from `<PREFIX>_EMBEDDING_MODEL` and
    /// `<PREFIX>_MODEL`, the key from `<PREFIX>_API_KEY`, where the prefix is
    /// `OPENAI` or `GEMINI`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unknown provider or a missing key.
    pub fn from_env() -> Result<Self> {
        let kind = match std::env::var("AI_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => ProviderKind::Gemini,
        };
        let prefix = kind.env_prefix();

        let api_key = std::env::var(format!("{prefix}_API_KEY")).map_err(|_| {
            RagError::ConfigError(format!("{prefix}_API_KEY environment variable not set"))
        })?;

        let mut settings = Self::new(kind, api_key);
        if let Ok(model) = std::env::var(format!("{prefix}_EMBEDDING_MODEL")) {
            settings.embedding_model = model;
        }
        if let Ok(model) = std::env::var(format!("{prefix}_MODEL")) {
            settings.generation_model = model;
        }
        Ok(settings)
    }
}
