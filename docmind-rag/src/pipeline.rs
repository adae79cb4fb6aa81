//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest-and-answer workflow by composing
//! an [`EmbeddingGateway`], a [`VectorIndex`], a [`GenerationProvider`] and a
//! [`ResilientInvoker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docmind_rag::{RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(embedder)
//!     .generation_provider(generator)
//!     .build()?;
//!
//! pipeline.index_documents(&texts, None).await?;
//! let output = pipeline.query("What color is the sky?", 5).await?;
//! println!("{}", output.answer);
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunking::{chunk_metadata, chunker_for};
use crate::config::RagConfig;
use crate::document::{Chunk, Metadata, RetrievalResult, SourceDocument};
use crate::embedding::{EmbeddingGateway, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{AnswerOutput, GenerationProvider, GenerationRequest};
use crate::index::{CollectionInfo, VectorIndex};
use crate::prompt::{build_context, format_system_prompt};
use crate::retry::ResilientInvoker;

/// Outcome of ingesting one [`SourceDocument`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    /// The ingested document's id.
    pub document_id: String,
    /// Index ids of the stored chunks, in chunk order.
    pub chunk_ids: Vec<String>,
    /// Number of chunks stored.
    pub chunks_processed: usize,
    /// Length of the extracted text in characters.
    pub text_length: usize,
}

/// The RAG pipeline orchestrator.
///
/// Every operation targets the collection named in [`RagConfig`]. Embedding
/// always happens before the index is touched, so no collection lock is held
/// across a provider call. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embeddings: EmbeddingGateway,
    index: Arc<VectorIndex>,
    generator: Arc<dyn GenerationProvider>,
    invoker: ResilientInvoker,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Embed `texts` as documents and store them in the collection.
    ///
    /// An empty `texts` is a no-op logged at warning level.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and index errors such as
    /// [`RagError::DimensionMismatch`] unchanged.
    pub async fn index_documents(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
    ) -> Result<()> {
        self.store(texts, metadatas).await.map(|_| ())
    }

    async fn store(&self, texts: &[String], metadatas: Option<&[Metadata]>) -> Result<Vec<String>> {
        let collection = self.collection();
        if texts.is_empty() {
            warn!(collection, "no texts provided for indexing");
            return Ok(Vec::new());
        }

        let borrowed: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self.embeddings.embed_documents(&borrowed).await?;

        let ids = self
            .index
            .add_documents(collection, texts, &embeddings, metadatas)
            .await
            .inspect_err(|e| error!(collection, error = %e, "failed to store documents"))?;

        info!(collection, count = ids.len(), "indexed documents");
        Ok(ids)
    }

    /// Chunk a document with the strategy for its kind, then embed and store
    /// the chunks.
    ///
    /// If the strategy yields nothing for non-blank text, the whole trimmed
    /// text is stored as a single chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if the document text is blank.
    pub async fn ingest(&self, document: &SourceDocument) -> Result<IngestReport> {
        let text = document.text.trim();
        if text.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "document '{}' contains no text",
                document.document_id
            )));
        }

        let chunker = chunker_for(document.kind, self.config.chunk_size, self.config.chunk_overlap);
        let mut chunks = chunker.chunk(document);
        if chunks.is_empty() {
            debug!(document.id = %document.document_id, "strategy produced no chunks, storing whole text");
            chunks.push(Chunk { text: text.to_string(), source_metadata: chunk_metadata(document, 0) });
        }

        let (texts, metadatas): (Vec<String>, Vec<Metadata>) =
            chunks.into_iter().map(|c| (c.text, c.source_metadata)).unzip();

        let chunk_ids = self.store(&texts, Some(&metadatas)).await.inspect_err(|e| {
            error!(document.id = %document.document_id, error = %e, "ingestion failed");
        })?;

        info!(document.id = %document.document_id, chunk_count = chunk_ids.len(), "ingested document");
        Ok(IngestReport {
            document_id: document.document_id.clone(),
            chunks_processed: chunk_ids.len(),
            chunk_ids,
            text_length: document.text.chars().count(),
        })
    }

    /// Embed `question` and return the `top_k` most similar stored texts.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `question` is blank.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let query_embedding = self.embeddings.embed_query(question).await?;
        self.index.search(self.collection(), &query_embedding, top_k).await
    }

    /// Answer `question` from the `top_k` most relevant stored texts.
    ///
    /// The answer is returned exactly as the model produced it. An empty
    /// collection still reaches the model, with an empty context.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if `question` is blank
    /// - [`RagError::RetriesExhausted`] if generation never succeeded
    pub async fn query(&self, question: &str, top_k: usize) -> Result<AnswerOutput> {
        self.answer(question, top_k, None).await
    }

    /// Like [`query`](Self::query), but abandons generation with
    /// [`RagError::Cancelled`] once `cancel` fires.
    pub async fn query_with_cancel(
        &self,
        question: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<AnswerOutput> {
        self.answer(question, top_k, Some(cancel)).await
    }

    async fn answer(
        &self,
        question: &str,
        top_k: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<AnswerOutput> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question cannot be empty".to_string()));
        }

        let results = self.retrieve(question, top_k).await?;
        if results.is_empty() {
            info!(collection = self.collection(), "no supporting documents found");
        }

        let request = GenerationRequest {
            system_prompt: format_system_prompt(&build_context(&results)),
            user_message: question.to_string(),
        };
        let correlation_id = Uuid::new_v4().to_string();
        let generator = &self.generator;
        let request = &request;
        let call = |_attempt: u32| generator.generate(request);

        let output = match cancel {
            Some(token) => self.invoker.invoke_with_cancel(token, Some(&correlation_id), call).await,
            None => self.invoker.invoke(Some(&correlation_id), call).await,
        }?;

        info!(correlation_id, context_count = results.len(), "answered question");
        Ok(output)
    }

    /// Remove documents from the collection by id, returning how many were removed.
    pub async fn delete_documents(&self, ids: &[String]) -> Result<usize> {
        self.index.delete_documents(self.collection(), ids).await
    }

    /// Remove every document and artifact of the collection.
    pub async fn delete_collection(&self) -> Result<()> {
        self.index.delete_collection(self.collection()).await
    }

    /// Number of documents in the collection.
    pub async fn document_count(&self) -> Result<usize> {
        self.index.document_count(self.collection()).await
    }

    /// Summarize the collection.
    pub async fn collection_info(&self) -> Result<CollectionInfo> {
        self.index.collection_info(self.collection()).await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding and generation providers are required. Without an explicit
/// [`VectorIndex`], one is opened at the configured `store_path`.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(embedder)
///     .generation_provider(generator)
///     .index(Arc::new(VectorIndex::open("/tmp/store")?))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    index: Option<Arc<VectorIndex>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default()`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Share an already opened vector index.
    pub fn index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a provider is missing, and
    /// [`RagError::Storage`] if the store directory cannot be created.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let index = match self.index {
            Some(index) => index,
            None => Arc::new(VectorIndex::open(&config.store_path)?),
        };
        let invoker = ResilientInvoker::new(config.retry.clone()).with_name(generator.name());

        Ok(RagPipeline {
            config,
            embeddings: EmbeddingGateway::new(embedding_provider),
            index,
            generator,
            invoker,
        })
    }
}
