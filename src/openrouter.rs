//! OpenRouter gateway backend.

use async_trait::async_trait;

use crate::config::TenantConfig;
use crate::document::ChatMessage;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::openai::OpenAiLm;

/// The OpenRouter chat completions endpoint.
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// A [`LanguageModel`] routed through the OpenRouter gateway.
///
/// OpenRouter speaks the OpenAI chat completions wire format, so this
/// composes over [`OpenAiLm`] with the gateway endpoint and the
/// attribution headers OpenRouter uses for app ranking (`HTTP-Referer`,
/// `X-Title`).
pub struct OpenRouterLm {
    inner: OpenAiLm,
}

impl OpenRouterLm {
    /// Create a gateway backend with the given key and model.
    ///
    /// `app_title` and `referer`, when set, are sent as attribution
    /// headers.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the key is empty.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        app_title: Option<&str>,
        referer: Option<&str>,
    ) -> Result<Self> {
        let mut inner = OpenAiLm::new(api_key, model)
            .map_err(rebrand)?
            .with_base_url(OPENROUTER_URL)
            .with_label("OpenRouter");
        if let Some(title) = app_title {
            inner = inner.with_header("X-Title", title);
        }
        if let Some(referer) = referer {
            inner = inner.with_header("HTTP-Referer", referer);
        }
        Ok(Self { inner })
    }

    /// Create a backend for a tenant, keyed from `OPENROUTER_API_KEY`,
    /// with the optional `OPENROUTER_REFERER` attribution.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the key variable is unset.
    pub fn from_env(config: &TenantConfig) -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| RagError::Generation {
            provider: "OpenRouter".into(),
            message: "OPENROUTER_API_KEY environment variable not set".into(),
        })?;
        let referer = std::env::var("OPENROUTER_REFERER").ok();
        let lm = Self::new(api_key, &config.model, Some("docrag"), referer.as_deref())?;
        Ok(Self {
            inner: lm.inner.with_temperature(config.temperature).with_max_tokens(config.max_tokens),
        })
    }
}

/// Relabel an [`OpenAiLm`] constructor error as an OpenRouter one.
fn rebrand(error: RagError) -> RagError {
    match error {
        RagError::Generation { message, .. } => {
            RagError::Generation { provider: "OpenRouter".into(), message }
        }
        other => other,
    }
}

#[async_trait]
impl LanguageModel for OpenRouterLm {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        self.inner.generate(prompt, history).await
    }
}
