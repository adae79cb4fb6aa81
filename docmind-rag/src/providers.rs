//! Construction of the configured model backends.
//!
//! The backend is chosen once, from [`ProviderSettings`], and handed to the
//! pipeline as trait objects. Backends compiled out by feature flags are
//! reported as configuration errors.

use std::sync::Arc;

use tracing::info;

use crate::config::{ProviderKind, ProviderSettings};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

fn feature_disabled(kind: ProviderKind) -> RagError {
    RagError::ConfigError(format!(
        "provider {kind:?} is not available; rebuild docmind-rag with the matching feature enabled"
    ))
}

/// Build the embedding backend selected by `settings`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if the API key is empty or the backend
/// was not compiled in.
pub fn build_embedding_provider(settings: &ProviderSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    info!(provider = ?settings.kind, model = %settings.embedding_model, "building embedding provider");
    match settings.kind {
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Ok(Arc::new(
            crate::openai::OpenAiEmbeddingProvider::new(settings.api_key.clone())?
                .with_model(settings.embedding_model.clone()),
        )),
        #[cfg(feature = "gemini")]
        ProviderKind::Gemini => Ok(Arc::new(
            crate::gemini::GeminiEmbeddingProvider::new(settings.api_key.clone())?
                .with_model(settings.embedding_model.clone()),
        )),
        #[allow(unreachable_patterns)]
        kind => Err(feature_disabled(kind)),
    }
}

/// Build the generation backend selected by `settings`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if the API key is empty or the backend
/// was not compiled in.
pub fn build_generation_provider(
    settings: &ProviderSettings,
) -> Result<Arc<dyn GenerationProvider>> {
    info!(provider = ?settings.kind, model = %settings.generation_model, "building generation provider");
    match settings.kind {
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Ok(Arc::new(
            crate::openai::OpenAiGenerationProvider::new(
                settings.api_key.clone(),
                settings.generation_model.clone(),
            )?
            .with_temperature(settings.temperature)
            .with_max_output_tokens(settings.max_output_tokens),
        )),
        #[cfg(feature = "gemini")]
        ProviderKind::Gemini => Ok(Arc::new(
            crate::gemini::GeminiGenerationProvider::new(
                settings.api_key.clone(),
                settings.generation_model.clone(),
            )?
            .with_temperature(settings.temperature)
            .with_max_output_tokens(settings.max_output_tokens),
        )),
        #[allow(unreachable_patterns)]
        kind => Err(feature_disabled(kind)),
    }
}
