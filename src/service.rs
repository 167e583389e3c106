//! The caller-facing facade over the tenant registry.
//!
//! [`RagService`] is what a bot front-end or HTTP layer holds: every
//! operation is keyed by tenant id and resolves the tenant's pipeline
//! through the [`TenantManager`] before delegating. The service carries
//! no state of its own and is cheap to share behind an `Arc`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::TenantConfig;
use crate::document::ChatMessage;
use crate::error::Result;
use crate::ingest::IngestReport;
use crate::pipeline::Answer;
use crate::tenant::{ProviderFactory, TenantManager};

/// Multi-tenant document question answering, one call per operation.
pub struct RagService {
    manager: TenantManager,
}

impl RagService {
    /// Create a service over a data directory and provider factory.
    pub fn new(data_dir: impl Into<PathBuf>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self { manager: TenantManager::new(data_dir, providers) }
    }

    /// The underlying tenant registry.
    pub fn manager(&self) -> &TenantManager {
        &self.manager
    }

    /// Ingest raw text into a tenant's index.
    ///
    /// Returns the number of chunks added. The index is mutated in memory;
    /// call [`save`](RagService::save) to persist.
    pub async fn ingest_text(
        &self,
        tenant_id: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize> {
        let tenant = self.manager.get_pipeline(tenant_id).await?;
        let count = tenant.ingest_text(text, metadata).await?;
        info!(tenant = tenant_id, chunk_count = count, "ingested text");
        Ok(count)
    }

    /// Ingest a single file into a tenant's index.
    pub async fn ingest_file(&self, tenant_id: &str, path: &Path) -> Result<usize> {
        let tenant = self.manager.get_pipeline(tenant_id).await?;
        let count = tenant.ingest_file(path).await?;
        info!(tenant = tenant_id, path = %path.display(), chunk_count = count, "ingested file");
        Ok(count)
    }

    /// Ingest a directory tree into a tenant's index, skipping files whose
    /// extension is not in `extensions` and collecting per-file failures
    /// instead of aborting.
    pub async fn ingest_directory(
        &self,
        tenant_id: &str,
        path: &Path,
        extensions: &[&str],
    ) -> Result<IngestReport> {
        let tenant = self.manager.get_pipeline(tenant_id).await?;
        tenant.ingest_directory(path, extensions).await
    }

    /// Answer a question against a tenant's documents.
    ///
    /// The returned [`Answer`] distinguishes a grounded answer
    /// (`used_context = true`, with sources) from a conversational
    /// fallback; a failed call is an error, never a silent empty answer.
    pub async fn ask(
        &self,
        tenant_id: &str,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Answer> {
        let tenant = self.manager.get_pipeline(tenant_id).await?;
        tenant.answer(query, history).await
    }

    /// Persist a tenant's index to disk.
    pub async fn save(&self, tenant_id: &str) -> Result<()> {
        let tenant = self.manager.get_pipeline(tenant_id).await?;
        tenant.save().await
    }

    /// Drop a tenant's cached pipeline and rebuild it from current on-disk
    /// config and index. Use after changing either out of band.
    pub async fn reload(&self, tenant_id: &str) -> Result<()> {
        self.manager.invalidate(tenant_id).await;
        self.manager.get_pipeline(tenant_id).await?;
        info!(tenant = tenant_id, "reloaded tenant");
        Ok(())
    }

    /// Drop a tenant's cached pipeline without rebuilding.
    pub async fn invalidate(&self, tenant_id: &str) -> bool {
        self.manager.invalidate(tenant_id).await
    }

    /// Tenant ids currently cached, sorted.
    pub async fn list_tenants(&self) -> Vec<String> {
        self.manager.list_tenants().await
    }

    /// Create a tenant's on-disk skeleton and config file.
    pub fn create_tenant(&self, tenant_id: &str, config: &TenantConfig) -> Result<()> {
        self.manager.create_tenant(tenant_id, config)
    }
}
