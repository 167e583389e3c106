//! Per-tenant pipeline instances and the tenant registry.
//!
//! Each tenant is an isolated unit: its own vector index, configuration,
//! and language-model backend, stored under `<data_dir>/<tenant_id>/`:
//!
//! ```text
//! <data_dir>/<tenant_id>/config.json         tenant settings
//! <data_dir>/<tenant_id>/vectorstore.index   binary vector matrix
//! <data_dir>/<tenant_id>/vectorstore.chunks  chunk side-table
//! <data_dir>/<tenant_id>/documents/          optional bootstrap corpus
//! ```
//!
//! [`TenantManager`] lazily constructs and caches one [`Tenant`] per id,
//! with single-flight construction: concurrent first-access callers share
//! one build and all observe its outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::chunking::FixedSizeChunker;
use crate::config::{LmProvider, TenantConfig};
use crate::document::{ChatMessage, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generate::Generator;
use crate::index::{SharedIndex, VectorIndex};
use crate::ingest::{DocumentIngestor, IngestReport};
use crate::llm::LanguageModel;
use crate::openai::{OpenAiEmbeddings, OpenAiLm};
use crate::openrouter::OpenRouterLm;
use crate::pipeline::{Answer, RagPipeline};
use crate::retriever::Retriever;

/// Extensions ingested from a tenant's `documents/` directory when a
/// fresh index is bootstrapped.
const BOOTSTRAP_EXTENSIONS: &[&str] = &["txt", "md"];

/// Resolves capability implementations from a tenant's configuration.
///
/// Resolution happens once per tenant construction; the returned
/// implementations live as long as the cached [`Tenant`]. Tests inject a
/// factory producing mocks.
pub trait ProviderFactory: Send + Sync {
    /// The embedding provider this tenant ingests and queries with.
    fn embedder(&self, config: &TenantConfig) -> Result<Arc<dyn EmbeddingProvider>>;

    /// The language model this tenant answers with.
    fn language_model(&self, config: &TenantConfig) -> Result<Arc<dyn LanguageModel>>;
}

/// The real [`ProviderFactory`]: OpenAI embeddings plus the chat backend
/// selected by [`TenantConfig::provider`], with API keys from the
/// environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiProviderFactory;

impl ProviderFactory for ApiProviderFactory {
    fn embedder(&self, _config: &TenantConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(OpenAiEmbeddings::from_env()?))
    }

    fn language_model(&self, config: &TenantConfig) -> Result<Arc<dyn LanguageModel>> {
        match config.provider {
            LmProvider::OpenAi => Ok(Arc::new(OpenAiLm::from_env(config)?)),
            LmProvider::OpenRouter => Ok(Arc::new(OpenRouterLm::from_env(config)?)),
        }
    }
}

/// One tenant's pipeline instance: index, configuration, ingestor, and
/// query pipeline bound together.
///
/// Reads (`answer`) run concurrently; structural operations (`ingest_*`,
/// `save`) are serialized by a per-tenant write lock so index mutation
/// never races a save.
pub struct Tenant {
    id: String,
    config: TenantConfig,
    index: SharedIndex,
    index_stem: PathBuf,
    ingestor: DocumentIngestor,
    pipeline: RagPipeline,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("index_stem", &self.index_stem)
            .finish_non_exhaustive()
    }
}

impl Tenant {
    /// The tenant id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The configuration this instance was built with.
    pub fn config(&self) -> &TenantConfig {
        &self.config
    }

    /// Number of chunks currently in the tenant's index.
    pub async fn chunk_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Answer a query through the tenant's pipeline.
    pub async fn answer(&self, query: &str, history: &[ChatMessage]) -> Result<Answer> {
        self.pipeline.answer(query, history).await
    }

    /// Ingest raw text, returning the number of chunks added.
    pub async fn ingest_text(
        &self,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let chunks = self.ingestor.ingest(&Document::new(text, metadata)).await?;
        Ok(chunks.len())
    }

    /// Ingest a file, returning the number of chunks added.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let chunks = self.ingestor.ingest_file(path).await?;
        Ok(chunks.len())
    }

    /// Ingest a directory tree, collecting per-file failures.
    pub async fn ingest_directory(
        &self,
        path: &Path,
        extensions: &[&str],
    ) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().await;
        self.ingestor.ingest_directory(path, extensions).await
    }

    /// Persist the tenant's index to its on-disk location.
    pub async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.index.read().await.save(&self.index_stem)
    }
}

/// Result type flowing through a shared build future. The error is
/// `Arc`-wrapped so every waiter can observe the same failure.
type BuildResult = std::result::Result<Arc<Tenant>, Arc<RagError>>;
type SharedBuild = Shared<BoxFuture<'static, BuildResult>>;

/// Lifecycle of a registry entry. Absence from the map is `Unloaded`.
enum TenantState {
    /// A construction is in flight; joiners await the shared build.
    Loading { epoch: u64, build: SharedBuild },
    /// The tenant is constructed and cached.
    Ready(Arc<Tenant>),
}

/// A registry of per-tenant pipelines with lazy, single-flight
/// construction.
///
/// At most one build is in flight per tenant id: concurrent first-access
/// callers join the same build and all observe its outcome. A failed
/// build removes the entry (no negative caching), so a later call retries
/// against the then-current on-disk state.
pub struct TenantManager {
    data_dir: PathBuf,
    providers: Arc<dyn ProviderFactory>,
    tenants: Arc<Mutex<HashMap<String, TenantState>>>,
    build_epoch: AtomicU64,
}

impl TenantManager {
    /// Create a manager rooted at `data_dir`, one subdirectory per tenant.
    pub fn new(data_dir: impl Into<PathBuf>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self {
            data_dir: data_dir.into(),
            providers,
            tenants: Arc::new(Mutex::new(HashMap::new())),
            build_epoch: AtomicU64::new(0),
        }
    }

    /// Get the tenant's pipeline instance, constructing and caching it on
    /// first access.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::TenantLoad`] if the tenant's on-disk config or
    /// index is missing or invalid. The failure is not cached.
    pub async fn get_pipeline(&self, tenant_id: &str) -> Result<Arc<Tenant>> {
        validate_tenant_id(tenant_id)?;

        let build = {
            let mut tenants = self.tenants.lock().await;
            match tenants.get(tenant_id) {
                Some(TenantState::Ready(tenant)) => return Ok(tenant.clone()),
                Some(TenantState::Loading { build, .. }) => build.clone(),
                None => {
                    let epoch = self.build_epoch.fetch_add(1, Ordering::Relaxed);
                    let build = self.start_build(tenant_id.to_string(), epoch);
                    tenants.insert(
                        tenant_id.to_string(),
                        TenantState::Loading { epoch, build: build.clone() },
                    );
                    build
                }
            }
        };

        build.await.map_err(|e| surface_load_error(tenant_id, &e))
    }

    /// Drop a cached tenant so the next access rebuilds from current
    /// on-disk config and index. Returns whether an entry was dropped.
    ///
    /// A build in flight at invalidation time is orphaned: callers already
    /// joined to it still receive its outcome, but the result is not
    /// cached.
    pub async fn invalidate(&self, tenant_id: &str) -> bool {
        let removed = self.tenants.lock().await.remove(tenant_id).is_some();
        if removed {
            info!(tenant = tenant_id, "invalidated cached tenant");
        }
        removed
    }

    /// Tenant ids currently cached (or building), sorted.
    pub async fn list_tenants(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Create a tenant's on-disk skeleton: its directory, an empty
    /// `documents/` directory, and `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the tenant already has a config
    /// file or the config fails validation, and [`RagError::Storage`] on
    /// I/O failure.
    pub fn create_tenant(&self, tenant_id: &str, config: &TenantConfig) -> Result<()> {
        validate_tenant_id(tenant_id)?;
        config.validate()?;

        let tenant_dir = self.data_dir.join(tenant_id);
        let config_path = tenant_dir.join("config.json");
        if config_path.exists() {
            return Err(RagError::Config(format!("tenant '{tenant_id}' already exists")));
        }

        let documents = tenant_dir.join("documents");
        std::fs::create_dir_all(&documents)
            .map_err(|e| RagError::Storage { path: documents, source: e })?;
        config.store(&config_path)?;

        info!(tenant = tenant_id, dir = %tenant_dir.display(), "created tenant");
        Ok(())
    }

    /// Start a shared build and hand back the joinable future.
    ///
    /// The build updates the registry itself on completion, but only if
    /// its epoch still matches the stored `Loading` entry; an invalidated
    /// build must not resurrect itself into the cache.
    fn start_build(&self, tenant_id: String, epoch: u64) -> SharedBuild {
        let data_dir = self.data_dir.clone();
        let providers = self.providers.clone();
        let tenants = self.tenants.clone();

        async move {
            let result = build_tenant(&data_dir, providers, &tenant_id).await;

            let mut map = tenants.lock().await;
            let current = matches!(
                map.get(&tenant_id),
                Some(TenantState::Loading { epoch: e, .. }) if *e == epoch
            );
            if current {
                match &result {
                    Ok(tenant) => {
                        map.insert(tenant_id.clone(), TenantState::Ready(tenant.clone()));
                    }
                    Err(_) => {
                        map.remove(&tenant_id);
                    }
                }
            }
            result.map_err(Arc::new)
        }
        .boxed()
        .shared()
    }
}

/// Construct a tenant from its on-disk state.
async fn build_tenant(
    data_dir: &Path,
    providers: Arc<dyn ProviderFactory>,
    tenant_id: &str,
) -> Result<Arc<Tenant>> {
    let load_err = |message: String| {
        error!(tenant = tenant_id, message = %message, "tenant construction failed");
        RagError::TenantLoad { tenant: tenant_id.to_string(), message }
    };

    let tenant_dir = data_dir.join(tenant_id);
    let config = TenantConfig::load(&tenant_dir.join("config.json"))
        .map_err(|e| load_err(e.to_string()))?;

    let embedder = providers.embedder(&config).map_err(|e| load_err(e.to_string()))?;
    let lm = providers.language_model(&config).map_err(|e| load_err(e.to_string()))?;

    let index_stem = tenant_dir.join("vectorstore");
    let persisted = VectorIndex::exists(&index_stem);
    let index = if persisted {
        VectorIndex::load(&index_stem).map_err(|e| load_err(e.to_string()))?
    } else {
        VectorIndex::new(embedder.dimensions()).map_err(|e| load_err(e.to_string()))?
    };
    let index: SharedIndex = Arc::new(RwLock::new(index));

    let chunker = Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap));
    let ingestor = DocumentIngestor::new(index.clone(), embedder.clone(), chunker);

    // First build with no saved index: seed it from the tenant's
    // documents/ directory, if present, and persist the result.
    let documents_dir = tenant_dir.join("documents");
    if !persisted && documents_dir.is_dir() {
        let report = ingestor
            .ingest_directory(&documents_dir, BOOTSTRAP_EXTENSIONS)
            .await
            .map_err(|e| load_err(e.to_string()))?;
        if !report.failures.is_empty() {
            warn!(
                tenant = tenant_id,
                failure_count = report.failures.len(),
                "some bootstrap documents failed to ingest"
            );
        }
        if report.chunks_added > 0 {
            index.read().await.save(&index_stem).map_err(|e| load_err(e.to_string()))?;
        }
    }

    let retriever = Retriever::new(index.clone(), embedder);
    let generator = Generator::new(lm, config.system_prompt.clone(), config.max_context_chars);
    let pipeline = RagPipeline::new(retriever, generator, config.top_k, config.rag_threshold);

    let chunk_count = index.read().await.len();
    info!(tenant = tenant_id, chunk_count, model = %config.model, "tenant ready");

    Ok(Arc::new(Tenant {
        id: tenant_id.to_string(),
        config,
        index,
        index_stem,
        ingestor,
        pipeline,
        write_lock: Mutex::new(()),
    }))
}

/// Tenant ids become directory names; restrict them accordingly.
fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    let valid = !tenant_id.is_empty()
        && tenant_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RagError::TenantLoad {
            tenant: tenant_id.to_string(),
            message: "tenant id must be non-empty and contain only alphanumerics, '-', or '_'"
                .to_string(),
        })
    }
}

/// Convert a shared build failure into the error each waiter receives.
fn surface_load_error(tenant_id: &str, error: &RagError) -> RagError {
    match error {
        RagError::TenantLoad { tenant, message } => {
            RagError::TenantLoad { tenant: tenant.clone(), message: message.clone() }
        }
        other => {
            RagError::TenantLoad { tenant: tenant_id.to_string(), message: other.to_string() }
        }
    }
}
