//! Generation-model contract used to answer questions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The structured output every generation call must produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOutput {
    /// The generated answer to the user's question.
    pub answer: String,
}

/// One generation call: a system turn and a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Instructions plus retrieved context.
    pub system_prompt: String,
    /// The user's question.
    pub user_message: String,
}

/// A model that turns a [`GenerationRequest`] into an [`AnswerOutput`].
///
/// Implementations classify their failures so the invocation layer can
/// decide what to retry:
///
/// - [`RagError::ProviderTimeout`](crate::RagError::ProviderTimeout) when the request timed out
/// - [`RagError::ProviderTransient`](crate::RagError::ProviderTransient) for rate limits and HTTP failures
/// - [`RagError::Cancelled`](crate::RagError::Cancelled) if the provider observed cancellation
/// - anything else for unexpected failures
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// A short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Run one generation attempt.
    async fn generate(&self, request: &GenerationRequest) -> Result<AnswerOutput>;
}
