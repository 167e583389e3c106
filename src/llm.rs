//! Language-model capability trait.

use async_trait::async_trait;

use crate::document::ChatMessage;
use crate::error::Result;

/// A language model that turns a prompt plus optional chat history into
/// generated text.
///
/// Implementations wrap concrete provider backends (direct API,
/// gateway-routed, local). Which implementation a tenant uses is resolved
/// once at pipeline construction from its configuration, never per call.
/// Provider failures (timeout, rate limit, invalid response) surface as
/// [`RagError::Generation`](crate::error::RagError::Generation); retry
/// policy belongs to the provider adapter, not to callers of this trait.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// The provider/model name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`, given prior chat history.
    ///
    /// `history` is ordered oldest-first and does not include `prompt`
    /// itself.
    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Result<String>;
}
