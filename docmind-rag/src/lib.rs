//! # docmind-rag
//!
//! Retrieval-augmented question answering over extracted document text.
//!
//! ## Overview
//!
//! The crate turns document text into a searchable collection and answers
//! questions from it:
//!
//! - [`Chunker`] strategies split text into word-bounded segments
//! - [`EmbeddingGateway`] validates calls to an [`EmbeddingProvider`]
//! - [`VectorIndex`] stores normalized vectors per collection, persists them
//!   to disk and serves cosine-similarity search
//! - [`ResilientInvoker`] runs generation calls with timeouts, jittered
//!   backoff and cancellation
//! - [`RagPipeline`] ties them together: ingest, retrieve, answer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docmind_rag::{
//!     ProviderSettings, RagConfig, RagPipeline, build_embedding_provider,
//!     build_generation_provider,
//! };
//!
//! let settings = ProviderSettings::from_env()?;
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::from_env()?)
//!     .embedding_provider(build_embedding_provider(&settings)?)
//!     .generation_provider(build_generation_provider(&settings)?)
//!     .build()?;
//!
//! pipeline.index_documents(&["The sky is blue.".to_string()], None).await?;
//! let output = pipeline.query("What color is the sky?", 5).await?;
//! ```
//!
//! ## Features
//!
//! - `openai`: OpenAI embedding and chat-completion providers
//! - `gemini`: Gemini embedding and content-generation providers
//! - `full`: both

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod flat;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod retry;

#[cfg(any(feature = "openai", feature = "gemini"))]
mod http;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, PageChunker, SentenceChunker, WordChunker, chunk, chunker_for};
pub use config::{ProviderKind, ProviderSettings, RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, DocumentKind, IndexedDocument, Metadata, RetrievalResult, SourceDocument,
};
pub use embedding::{EmbeddingGateway, EmbeddingMode, EmbeddingProvider};
pub use error::{RagError, Result};
pub use flat::{FlatIndex, normalize};
pub use generation::{AnswerOutput, GenerationProvider, GenerationRequest};
pub use index::{CollectionInfo, VectorIndex};
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder};
pub use providers::{build_embedding_provider, build_generation_provider};
pub use retry::{ResilientInvoker, RetryAttempt, RetryPolicy};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, GeminiGenerationProvider};
#[cfg(feature = "openai")]
pub use openai::{OpenAiEmbeddingProvider, OpenAiGenerationProvider};
