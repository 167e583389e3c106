//! OpenAI API backends: embeddings and chat completions over `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::TenantConfig;
use crate::document::{ChatMessage, Role};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

/// The default OpenAI embeddings endpoint.
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// The default OpenAI chat completions endpoint.
const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The dimensionality of `text-embedding-3-small`.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Batch requests go through a single `/v1/embeddings` call. The model
/// defaults to `text-embedding-3-small`; `with_dimensions` enables
/// Matryoshka truncation for models that support it.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAiEmbeddings {
    /// Create a provider with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Embedding {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider from the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the variable is unset.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::Embedding {
            provider: "OpenAI".into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the embedding model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensionality (Matryoshka truncation).
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self.request_dimensions = Some(dimensions);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
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
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Extract a readable error message from a non-success response body.
async fn error_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ApiErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: "OpenAI".into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "OpenAI", batch_size = texts.len(), model = %self.model, "embedding batch");

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "embedding request failed");
                RagError::Embedding {
                    provider: "OpenAI".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            error!(provider = "OpenAI", %status, "embedding API error");
            return Err(RagError::Embedding {
                provider: "OpenAI".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| RagError::Embedding {
            provider: "OpenAI".into(),
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completions backend ───────────────────────────────────────

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// A [`LanguageModel`] speaking the OpenAI chat completions wire format.
///
/// Also serves OpenAI-compatible servers through
/// [`with_base_url`](OpenAiLm::with_base_url); gateway backends such as
/// [`OpenRouterLm`](crate::openrouter::OpenRouterLm) compose over it.
pub struct OpenAiLm {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    headers: Vec<(String, String)>,
    label: String,
}

impl OpenAiLm {
    /// Create a backend with the given key and model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the key is empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Generation {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            url: CHAT_URL.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1000,
            headers: Vec::new(),
            label: "OpenAI".into(),
        })
    }

    /// Create a backend for a tenant, keyed from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the variable is unset.
    pub fn from_env(config: &TenantConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::Generation {
            provider: "OpenAI".into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Ok(Self::new(api_key, &config.model)?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens))
    }

    /// Point at an OpenAI-compatible chat completions endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-answer token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Add an extra header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the provider label used in logs and error messages.
    pub(crate) fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn generation_error(&self, message: String) -> RagError {
        RagError::Generation { provider: self.label.clone(), message }
    }
}

#[async_trait]
impl LanguageModel for OpenAiLm {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages: Vec<WireMessage<'_>> = history
            .iter()
            .map(|m| WireMessage { role: wire_role(m.role), content: &m.content })
            .collect();
        messages.push(WireMessage { role: "user", content: prompt });

        debug!(provider = %self.label, model = %self.model, message_count = messages.len(), "chat completion request");

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(&self.url).bearer_auth(&self.api_key).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = %self.label, error = %e, "chat request failed");
            self.generation_error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            error!(provider = %self.label, %status, "chat API error");
            return Err(self.generation_error(format!("API returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.generation_error(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.generation_error("API returned no completion".into()))
    }
}
