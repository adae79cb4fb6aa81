//! Embedding providers and the validating gateway in front of them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// Whether text is embedded for storage or for lookup.
///
/// Some providers encode the two differently, so the mode travels with every
/// request instead of being collapsed into one code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Text that will be stored in the index.
    Document,
    /// A question that will be searched for.
    Query,
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Gemini, OpenAI, ...)
/// behind a unified async interface. Callers normally go through an
/// [`EmbeddingGateway`], which validates inputs and outputs.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let vectors = provider.embed_documents(&["hello", "world"]).await?;
/// let query = provider.embed_query("greeting").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// A short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Embed a batch of texts for storage, one vector per input.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single question for search.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Validating front end to an [`EmbeddingProvider`].
///
/// Rejects empty input before any network call and checks that every vector
/// of one response shares one width. Width consistency across calls is the
/// vector index's concern.
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingGateway {
    /// Wrap a provider.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed documents for storage.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `texts` is empty, and
    /// [`RagError::EmbeddingError`] if the provider returns the wrong number
    /// of vectors or vectors of differing widths.
    pub async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RagError::InvalidInput("text list for embedding cannot be empty".into()));
        }
        let provider = self.provider.name();
        debug!(provider, count = texts.len(), "embedding documents");

        let vectors = self.provider.embed_documents(texts).await.inspect_err(|e| {
            error!(provider, error = %e, "document embedding failed");
        })?;

        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: provider.to_string(),
                message: format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            });
        }
        if let Some(first) = vectors.first() {
            if let Some(odd) = vectors.iter().find(|v| v.len() != first.len()) {
                return Err(RagError::EmbeddingError {
                    provider: provider.to_string(),
                    message: format!(
                        "inconsistent widths in one response: {} and {}",
                        first.len(),
                        odd.len()
                    ),
                });
            }
        }
        Ok(vectors)
    }

    /// Embed a question for search.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `text` is blank.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("query text cannot be empty".into()));
        }
        let provider = self.provider.name();
        debug!(provider, text_len = text.len(), "embedding query");

        self.provider.embed_query(text).await.inspect_err(|e| {
            error!(provider, error = %e, "query embedding failed");
        })
    }
}
