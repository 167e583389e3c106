//! Per-tenant configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The language-model backend a tenant uses.
///
/// Resolved to a concrete [`LanguageModel`](crate::llm::LanguageModel)
/// implementation once at pipeline construction, never per call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LmProvider {
    /// The OpenAI API (or an OpenAI-compatible server).
    OpenAi,
    /// The OpenRouter gateway.
    OpenRouter,
}

/// Per-tenant settings, loaded once from the tenant's `config.json` and
/// immutable for the lifetime of a cached pipeline instance.
///
/// A config change takes effect by invalidating the tenant so the next
/// access rebuilds from disk. Missing fields take the defaults below, so
/// a minimal config file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TenantConfig {
    /// Which language-model backend to use.
    pub provider: LmProvider,
    /// Model name passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate per answer.
    pub max_tokens: u32,
    /// Number of chunks to retrieve per query.
    pub top_k: usize,
    /// Minimum top retrieval score required to ground an answer, in `[0, 1]`.
    pub rag_threshold: f32,
    /// Optional system prompt override prepended to every generation call.
    pub system_prompt: Option<String>,
    /// Maximum characters per chunk at ingestion.
    pub chunk_size: usize,
    /// Overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Budget for total context text embedded in a grounded prompt.
    pub max_context_chars: usize,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            provider: LmProvider::OpenRouter,
            model: "openai/gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            top_k: 3,
            rag_threshold: 0.5,
            system_prompt: None,
            chunk_size: 500,
            chunk_overlap: 50,
            max_context_chars: 6000,
        }
    }
}

impl TenantConfig {
    /// Create a new builder for constructing a [`TenantConfig`].
    pub fn builder() -> TenantConfigBuilder {
        TenantConfigBuilder::default()
    }

    /// Load and validate a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the file is unreadable, not valid
    /// JSON, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("cannot read config at {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RagError::Config(format!("invalid config at {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] on serialization or write failure.
    pub fn store(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RagError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            RagError::Config(format!("cannot write config at {}: {e}", path.display()))
        })
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `rag_threshold` is outside `[0, 1]`
    /// - `max_context_chars == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.rag_threshold) {
            return Err(RagError::Config(format!(
                "rag_threshold ({}) must be within [0, 1]",
                self.rag_threshold
            )));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::Config("max_context_chars must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`TenantConfig`].
#[derive(Debug, Clone, Default)]
pub struct TenantConfigBuilder {
    config: TenantConfig,
}

impl TenantConfigBuilder {
    /// Set the language-model backend.
    pub fn provider(mut self, provider: LmProvider) -> Self {
        self.config.provider = provider;
        self
    }

    /// Set the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the per-answer token limit.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    /// Set the relevance-gate threshold.
    pub fn rag_threshold(mut self, threshold: f32) -> Self {
        self.config.rag_threshold = threshold;
        self
    }

    /// Set the system prompt override.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Set the ingestion chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the grounded-prompt context budget in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Build the [`TenantConfig`], validating consistency.
    ///
    /// # Errors
    ///
    /// See [`TenantConfig::validate`].
    pub fn build(self) -> Result<TenantConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_validates_overlap_against_chunk_size() {
        let err = TenantConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn builder_rejects_zero_top_k_and_out_of_range_threshold() {
        assert!(TenantConfig::builder().top_k(0).build().is_err());
        assert!(TenantConfig::builder().rag_threshold(1.5).build().is_err());
        assert!(TenantConfig::builder().rag_threshold(-0.1).build().is_err());
    }

    #[test]
    fn minimal_json_takes_defaults() {
        let config: TenantConfig =
            serde_json::from_str(r#"{"model": "gpt-4o", "provider": "openai"}"#).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.provider, LmProvider::OpenAi);
        assert_eq!(config.top_k, TenantConfig::default().top_k);
        assert_eq!(config.rag_threshold, TenantConfig::default().rag_threshold);
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TenantConfig::builder()
            .model("gpt-4o-mini")
            .top_k(5)
            .rag_threshold(0.4)
            .system_prompt("answer briefly")
            .build()
            .unwrap();
        config.store(&path).unwrap();
        assert_eq!(TenantConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(TenantConfig::load(&path), Err(RagError::Config(_))));
        assert!(matches!(
            TenantConfig::load(&dir.path().join("missing.json")),
            Err(RagError::Config(_))
        ));
    }
}
