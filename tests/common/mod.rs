//! Shared test doubles for integration tests.
#![allow(dead_code)] // each test binary uses a subset of these helpers

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrag::mock::{FailingLm, MockLm};
use docrag::{EmbeddingProvider, LanguageModel, ProviderFactory, Result, TenantConfig};

/// An embedding provider with a fixed text → vector table, so tests can
/// dictate exact similarity scores. Unknown texts fall back to a
/// deterministic hash-based vector.
pub struct TableEmbedding {
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
    fallback: docrag::mock::MockEmbedding,
}

impl TableEmbedding {
    pub fn new(dimensions: usize, table: HashMap<String, Vec<f32>>, delay: Option<Duration>) -> Self {
        Self { dimensions, table, delay, fallback: docrag::mock::MockEmbedding::new(dimensions) }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.table.get(text) {
            Some(vector) => Ok(vector.clone()),
            None => self.fallback.embed(text).await,
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A provider factory over test doubles. Counts constructions and keeps
/// the most recently built [`MockLm`] so tests can inspect prompts.
pub struct TestFactory {
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
    embed_delay: Option<Duration>,
    reply: String,
    fail_generation: bool,
    builds: AtomicUsize,
    last_lm: Mutex<Option<Arc<MockLm>>>,
}

impl TestFactory {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: HashMap::new(),
            embed_delay: None,
            reply: "canned answer".to_string(),
            fail_generation: false,
            builds: AtomicUsize::new(0),
            last_lm: Mutex::new(None),
        }
    }

    /// Pin the embedding vector for an exact text.
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    /// Slow down every embedding call (used to widen construction races).
    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = Some(delay);
        self
    }

    /// Make every generation call fail.
    pub fn with_failing_generation(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    /// How many tenant constructions resolved providers so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// The language model handed to the most recently built tenant.
    pub fn last_lm(&self) -> Arc<MockLm> {
        self.last_lm.lock().unwrap().clone().expect("no tenant built yet")
    }
}

impl ProviderFactory for TestFactory {
    fn embedder(&self, _config: &TenantConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TableEmbedding::new(self.dimensions, self.table.clone(), self.embed_delay)))
    }

    fn language_model(&self, _config: &TenantConfig) -> Result<Arc<dyn LanguageModel>> {
        if self.fail_generation {
            return Ok(Arc::new(FailingLm));
        }
        let lm = Arc::new(MockLm::new(self.reply.clone()));
        *self.last_lm.lock().unwrap() = Some(lm.clone());
        Ok(lm)
    }
}
