//! Deterministic mock capabilities for tests, demos, and offline use.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::document::ChatMessage;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

/// A deterministic embedding provider that derives a normalized vector
/// from a hash of the text. No network, no model weights; suitable for
/// tests and offline pipelines where only self-consistency matters.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl MockEmbedding {
    /// Create a provider producing vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut embedding = vec![0.0f32; self.dimensions];
        for (i, value) in embedding.iter_mut().enumerate() {
            *value = ((hash.wrapping_add(i as u64)) as f32).sin();
        }
        // L2-normalize so cosine similarity is just the dot product.
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A language model that returns a canned reply and records every call.
///
/// Tests use [`prompts`](MockLm::prompts) and
/// [`histories`](MockLm::histories) to assert what the pipeline actually
/// sent.
#[derive(Debug, Default)]
pub struct MockLm {
    reply: String,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl MockLm {
    /// Create a mock that always answers with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), calls: Mutex::new(Vec::new()) }
    }

    /// All prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    /// All chat histories received so far, oldest first.
    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().iter().map(|(_, h)| h.clone()).collect()
    }

    /// Number of generate calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push((prompt.to_string(), history.to_vec()));
        Ok(self.reply.clone())
    }
}

/// A language model whose every call fails, for error-propagation tests.
#[derive(Debug, Default)]
pub struct FailingLm;

#[async_trait]
impl LanguageModel for FailingLm {
    fn name(&self) -> &str {
        "failing-mock"
    }

    async fn generate(&self, _prompt: &str, _history: &[ChatMessage]) -> Result<String> {
        Err(RagError::Generation {
            provider: "failing-mock".to_string(),
            message: "simulated provider outage".to_string(),
        })
    }
}
