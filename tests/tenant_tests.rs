//! Tenant lifecycle: lazy single-flight construction, invalidation,
//! persistence, and directory ingestion through the service facade.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::TestFactory;
use docrag::{RagError, RagService, TenantConfig, TenantManager};

fn default_config() -> TenantConfig {
    TenantConfig::builder().top_k(3).rag_threshold(0.5).build().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_constructs_the_tenant_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let factory =
        Arc::new(TestFactory::new(4).with_embed_delay(Duration::from_millis(20)));
    let manager = Arc::new(TenantManager::new(dir.path(), factory.clone()));

    manager.create_tenant("acme", &default_config()).unwrap();
    // Seed a bootstrap document so construction suspends on embedding and
    // the other callers join the in-flight build.
    std::fs::write(dir.path().join("acme/documents/seed.txt"), "seed content").unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.get_pipeline("acme").await }));
    }

    let mut tenants = Vec::new();
    for handle in handles {
        tenants.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(factory.build_count(), 1);
    for tenant in &tenants[1..] {
        assert!(Arc::ptr_eq(&tenants[0], tenant));
    }
    assert_eq!(tenants[0].chunk_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn construction_failure_reaches_all_waiters_and_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(4));
    let manager = Arc::new(TenantManager::new(dir.path(), factory.clone()));

    // No config on disk: every concurrent caller must see TenantLoad.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.get_pipeline("ghost").await }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        match err {
            RagError::TenantLoad { tenant, .. } => assert_eq!(tenant, "ghost"),
            other => panic!("expected TenantLoad, got {other}"),
        }
    }
    assert!(manager.list_tenants().await.is_empty());

    // Operator fixes the tenant; the next call succeeds without restart.
    manager.create_tenant("ghost", &default_config()).unwrap();
    assert!(manager.get_pipeline("ghost").await.is_ok());
}

#[tokio::test]
async fn save_invalidate_reload_round_trips_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(
        TestFactory::new(2)
            .with_vector("fact one", vec![1.0, 0.0])
            .with_vector("find it", vec![1.0, 0.0]),
    );
    let service = RagService::new(dir.path(), factory.clone());
    service.create_tenant("acme", &default_config()).unwrap();

    service.ingest_text("acme", "fact one", HashMap::new()).await.unwrap();
    service.save("acme").await.unwrap();

    // Drop the cached tenant; the rebuilt one must load the saved index.
    assert!(service.invalidate("acme").await);
    let answer = service.ask("acme", "find it", &[]).await.unwrap();
    assert!(answer.used_context);
    assert_eq!(answer.sources[0].text, "fact one");
}

#[tokio::test]
async fn unsaved_chunks_do_not_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(2));
    let service = RagService::new(dir.path(), factory);
    service.create_tenant("acme", &default_config()).unwrap();

    service.ingest_text("acme", "ephemeral", HashMap::new()).await.unwrap();
    service.reload("acme").await.unwrap();

    let tenant = service.manager().get_pipeline("acme").await.unwrap();
    assert_eq!(tenant.chunk_count().await, 0);
}

#[tokio::test]
async fn invalidate_picks_up_an_on_disk_config_change() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(2));
    let service = RagService::new(dir.path(), factory);
    service.create_tenant("acme", &default_config()).unwrap();

    let before = service.manager().get_pipeline("acme").await.unwrap();
    assert_eq!(before.config().top_k, 3);

    // Edit the config behind the manager's back, as an operator would.
    let config_path = dir.path().join("acme/config.json");
    let updated = TenantConfig::builder().top_k(7).rag_threshold(0.2).build().unwrap();
    updated.store(&config_path).unwrap();

    // Still cached: the old settings remain in effect...
    let cached = service.manager().get_pipeline("acme").await.unwrap();
    assert_eq!(cached.config().top_k, 3);

    // ...until invalidation forces a rebuild from disk.
    service.invalidate("acme").await;
    let rebuilt = service.manager().get_pipeline("acme").await.unwrap();
    assert_eq!(rebuilt.config().top_k, 7);
    assert_eq!(rebuilt.config().rag_threshold, 0.2);
}

#[tokio::test]
async fn corrupt_persisted_index_fails_the_tenant_load_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(2));
    let service = RagService::new(dir.path(), factory);
    service.create_tenant("acme", &default_config()).unwrap();

    service.ingest_text("acme", "some fact", HashMap::new()).await.unwrap();
    service.save("acme").await.unwrap();
    service.invalidate("acme").await;

    std::fs::write(dir.path().join("acme/vectorstore.index"), b"garbage").unwrap();

    let err = service.ask("acme", "anything", &[]).await.unwrap_err();
    match err {
        RagError::TenantLoad { tenant, .. } => assert_eq!(tenant, "acme"),
        other => panic!("expected TenantLoad, got {other}"),
    }
}

#[tokio::test]
async fn directory_ingestion_reports_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(2));
    let service = RagService::new(dir.path(), factory);
    service.create_tenant("acme", &default_config()).unwrap();

    let docs = tempfile::tempdir().unwrap();
    std::fs::write(docs.path().join("good.txt"), "valid file").unwrap();
    std::fs::write(docs.path().join("bad.txt"), [0xff, 0xfe]).unwrap();

    let report = service.ingest_directory("acme", docs.path(), &[".txt"]).await.unwrap();
    assert_eq!(report.chunks_added, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("bad.txt"));
}

#[tokio::test]
async fn bootstrap_ingests_the_documents_directory_on_first_build() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(2));
    let service = RagService::new(dir.path(), factory);
    service.create_tenant("acme", &default_config()).unwrap();
    std::fs::write(dir.path().join("acme/documents/notes.txt"), "seeded knowledge").unwrap();

    let tenant = service.manager().get_pipeline("acme").await.unwrap();
    assert_eq!(tenant.chunk_count().await, 1);

    // The bootstrap also persisted the index: a reload keeps the chunks.
    service.reload("acme").await.unwrap();
    let reloaded = service.manager().get_pipeline("acme").await.unwrap();
    assert_eq!(reloaded.chunk_count().await, 1);
}

#[tokio::test]
async fn tenants_are_isolated_and_listed() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(TestFactory::new(2));
    let service = RagService::new(dir.path(), factory);
    service.create_tenant("alpha", &default_config()).unwrap();
    service.create_tenant("beta", &default_config()).unwrap();

    service.ingest_text("alpha", "alpha's private fact", HashMap::new()).await.unwrap();

    let alpha = service.manager().get_pipeline("alpha").await.unwrap();
    let beta = service.manager().get_pipeline("beta").await.unwrap();
    assert_eq!(alpha.chunk_count().await, 1);
    assert_eq!(beta.chunk_count().await, 0);

    assert_eq!(service.list_tenants().await, vec!["alpha".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn create_tenant_refuses_to_overwrite_an_existing_config() {
    let dir = tempfile::tempdir().unwrap();
    let service = RagService::new(dir.path(), Arc::new(TestFactory::new(2)));
    service.create_tenant("acme", &default_config()).unwrap();
    let err = service.create_tenant("acme", &default_config()).unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}
