//! Integration tests for the three-phase pipeline.
//!
//! These tests drive the real processors and batch executor against mock
//! HTTP catalogs and an in-memory database.

use std::str::FromStr;
use std::sync::Arc;

use lexgraph_core::{
    BatchConfig, BatchExecutor, Category, Database, DetailProcessor, DiscoveryProcessor,
    DocumentState, DocumentStore, ExecutorError, JsonCatalogParser, NaturalKey, PipelineConfig,
    RelationsProcessor, RetryConfig, Utf8TextExtractor,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Pipeline configuration tuned for tests: no pacing, minimal backoff.
fn fast_config(listing_url: &str) -> PipelineConfig {
    let retry = RetryConfig {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        exponential_base: 2.0,
        timeout_secs: 5,
    };
    PipelineConfig {
        user_agent: "lexgraph-test/0.1".to_string(),
        server_delay_ms: 0,
        max_consecutive_errors: 5,
        max_pages_per_category: 10,
        max_document_errors: 2,
        categories: vec![Category {
            name: "laws".to_string(),
            jurisdiction: "ks".to_string(),
            listing_url: listing_url.to_string(),
        }],
        discovery_retry: retry.clone(),
        detail_retry: retry,
        discovery_batch: BatchConfig::default(),
        detail_batch: BatchConfig {
            commit_frequency: 2,
            progress_log_frequency: 100,
        },
        relations_batch: BatchConfig::default(),
    }
}

async fn test_store() -> DocumentStore {
    let db = Database::new_in_memory().await.expect("in-memory db");
    DocumentStore::new(db)
}

async fn run_discovery(config: &PipelineConfig, store: &DocumentStore) -> lexgraph_core::PhaseStats {
    let processor =
        DiscoveryProcessor::new(config, Arc::new(JsonCatalogParser)).expect("build discovery");
    BatchExecutor::for_phase(config, &config.discovery_batch)
        .run(&processor, store)
        .await
        .expect("discovery run")
}

async fn run_detail(
    config: &PipelineConfig,
    store: &DocumentStore,
) -> Result<lexgraph_core::PhaseStats, ExecutorError> {
    let processor =
        DetailProcessor::new(config, Arc::new(Utf8TextExtractor)).expect("build detail");
    BatchExecutor::for_phase(config, &config.detail_batch)
        .run(&processor, store)
        .await
}

async fn run_relations(config: &PipelineConfig, store: &DocumentStore) -> lexgraph_core::PhaseStats {
    BatchExecutor::for_phase(config, &config.relations_batch)
        .run(&RelationsProcessor::new(), store)
        .await
        .expect("relations run")
}

/// Mounts a catalog listing page for a given page number.
async fn mount_catalog_page(server: &MockServer, page: u32, body: &str) {
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"))
        .mount(server)
        .await;
}

/// Mounts a document body endpoint.
async fn mount_document(server: &MockServer, doc_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(doc_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_discovery_paginates_and_is_idempotent() {
    let server = MockServer::start().await;
    let page1 = format!(
        r#"{{ "entries": [
            {{ "source_id": "2003/25", "title": "Law A", "document_url": "{0}/docs/a" }},
            {{ "source_id": "2004/18", "title": "Law B", "document_url": "{0}/docs/b" }}
        ], "has_next": true }}"#,
        server.uri()
    );
    let page2 = format!(
        r#"{{ "entries": [
            {{ "source_id": "2005/02", "title": "Law C", "document_url": "{0}/docs/c" }}
        ], "has_next": false }}"#,
        server.uri()
    );
    mount_catalog_page(&server, 1, &page1).await;
    mount_catalog_page(&server, 2, &page2).await;

    let config = fast_config(&format!("{}/catalog", server.uri()));
    let store = test_store().await;

    let stats = run_discovery(&config, &store).await;
    assert_eq!(stats.succeeded, 1);
    assert_eq!(store.count_documents(None).await.unwrap(), 3);

    // Second run finds the same listings and changes nothing
    run_discovery(&config, &store).await;
    assert_eq!(store.count_documents(None).await.unwrap(), 3);
    assert_eq!(
        store
            .count_documents(Some(DocumentState::Discovered))
            .await
            .unwrap(),
        3
    );

    let doc = store
        .get_document(&NaturalKey::from_str("ks:2003/25").unwrap())
        .await
        .unwrap()
        .expect("document discovered");
    assert_eq!(doc.category.as_deref(), Some("laws"));
    assert_eq!(doc.title.as_deref(), Some("Law A"));
}

#[tokio::test]
async fn test_detail_fetches_extracts_and_promotes() {
    let server = MockServer::start().await;
    let page = format!(
        r#"{{ "entries": [
            {{ "source_id": "2003/25", "title": "Law A", "document_url": "{0}/docs/a" }}
        ], "has_next": false }}"#,
        server.uri()
    );
    mount_catalog_page(&server, 1, &page).await;
    mount_document(&server, "/docs/a", "Full text of Law A.").await;

    let config = fast_config(&format!("{}/catalog", server.uri()));
    let store = test_store().await;
    run_discovery(&config, &store).await;

    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.succeeded, 1);

    let doc = store
        .get_document(&NaturalKey::from_str("ks:2003/25").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.state().unwrap(), DocumentState::Detailed);
    assert_eq!(doc.content_text.as_deref(), Some("Full text of Law A."));
    assert_eq!(doc.content_blob.as_deref(), Some("Full text of Law A.".as_bytes()));

    // Re-run selects nothing: the document already advanced
    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn test_detail_retries_transient_errors_then_succeeds() {
    let server = MockServer::start().await;

    // First attempt is rate limited, second succeeds
    Mock::given(method("GET"))
        .and(path("/docs/flaky"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_document(&server, "/docs/flaky", "Recovered text.").await;

    let config = fast_config("https://unused.invalid/catalog");
    let store = test_store().await;
    let key = NaturalKey::from_str("ks:2009/01").unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.upsert_stub(
        &key,
        Some("laws"),
        None,
        &format!("{}/docs/flaky", server.uri()),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.succeeded, 1);

    let doc = store.get_document(&key).await.unwrap().unwrap();
    assert_eq!(doc.content_text.as_deref(), Some("Recovered text."));
}

#[tokio::test]
async fn test_detail_error_ceiling_parks_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = fast_config("https://unused.invalid/catalog");
    let store = test_store().await;
    let key = NaturalKey::from_str("ks:1999/07").unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.upsert_stub(
        &key,
        Some("laws"),
        None,
        &format!("{}/docs/gone", server.uri()),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    // First run: one failure recorded, state unchanged
    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.failed, 1);
    let doc = store.get_document(&key).await.unwrap().unwrap();
    assert_eq!(doc.state().unwrap(), DocumentState::Discovered);
    assert_eq!(doc.error_count, 1);

    // Second run reaches max_document_errors = 2: terminal detail_failed
    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.failed, 1);
    let doc = store.get_document(&key).await.unwrap().unwrap();
    assert_eq!(doc.state().unwrap(), DocumentState::DetailFailed);

    // Parked documents are no longer selected
    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn test_detail_circuit_breaker_keeps_committed_accounting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = fast_config("https://unused.invalid/catalog");
    config.max_consecutive_errors = 2;
    config.max_document_errors = 5;

    let store = test_store().await;
    let mut tx = store.begin().await.unwrap();
    for id in ["01", "02", "03"] {
        tx.upsert_stub(
            &NaturalKey::new("ks", id),
            Some("laws"),
            None,
            &format!("{}/docs/{id}", server.uri()),
        )
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();

    let error = run_detail(&config, &store).await.unwrap_err();
    match error {
        ExecutorError::CircuitBreaker { consecutive, stats } => {
            assert_eq!(consecutive, 2);
            assert_eq!(stats.processed, 2);
            assert_eq!(stats.failed, 2);
        }
        other => panic!("expected circuit breaker, got {other:?}"),
    }

    // The failure accounting of processed items survived the abort
    let doc = store
        .get_document(&NaturalKey::new("ks", "01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.error_count, 1);
    // The third item was never attempted
    let doc = store
        .get_document(&NaturalKey::new("ks", "03"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.error_count, 0);
}

#[tokio::test]
async fn test_rerun_after_abort_processes_only_unfinished_items() {
    let server = MockServer::start().await;
    mount_document(&server, "/docs/a", "Text of law A.").await;
    mount_document(&server, "/docs/b", "Text of law B.").await;
    // Document C fails once, then the endpoint recovers
    Mock::given(method("GET"))
        .and(path("/docs/c"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_document(&server, "/docs/c", "Text of law C.").await;

    let mut config = fast_config("https://unused.invalid/catalog");
    config.max_consecutive_errors = 1;
    config.detail_batch.commit_frequency = 10;

    let store = test_store().await;
    let mut tx = store.begin().await.unwrap();
    for (id, doc_path) in [("01", "a"), ("02", "b"), ("03", "c")] {
        tx.upsert_stub(
            &NaturalKey::new("ks", id),
            Some("laws"),
            None,
            &format!("{}/docs/{doc_path}", server.uri()),
        )
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();

    // First run aborts at document C, two items already finished
    let error = run_detail(&config, &store).await.unwrap_err();
    match error {
        ExecutorError::CircuitBreaker { stats, .. } => {
            assert_eq!(stats.processed, 3);
            assert_eq!(stats.succeeded, 2);
            assert_eq!(stats.failed, 1);
        }
        other => panic!("expected circuit breaker, got {other:?}"),
    }

    // The re-run selects exactly the unfinished document
    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.succeeded, 1);

    // Final contents match what an uninterrupted run would have produced
    for (id, text) in [
        ("01", "Text of law A."),
        ("02", "Text of law B."),
        ("03", "Text of law C."),
    ] {
        let doc = store
            .get_document(&NaturalKey::new("ks", id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.state().unwrap(), DocumentState::Detailed);
        assert_eq!(doc.content_text.as_deref(), Some(text));
        assert_eq!(doc.error_count, 0);
    }
    assert_eq!(
        store
            .count_documents(Some(DocumentState::Discovered))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_detail_skips_placeholders_without_url() {
    let config = fast_config("https://unused.invalid/catalog");
    let store = test_store().await;
    let mut tx = store.begin().await.unwrap();
    tx.ensure_placeholder(&NaturalKey::new("ks", "phantom"), None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let stats = run_detail(&config, &store).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_full_run_builds_cross_reference_graph() {
    let server = MockServer::start().await;
    let page = format!(
        r#"{{ "entries": [
            {{ "source_id": "04/L-123", "title": "Amending Law", "document_url": "{0}/docs/new" }},
            {{ "source_id": "2003/25", "title": "Old Law", "document_url": "{0}/docs/old" }}
        ], "has_next": false }}"#,
        server.uri()
    );
    mount_catalog_page(&server, 1, &page).await;
    mount_document(
        &server,
        "/docs/new",
        "This law amends Law No. 2003/25 and repeals Regulation 1999/44.",
    )
    .await;
    mount_document(&server, "/docs/old", "Original text without citations.").await;

    let config = fast_config(&format!("{}/catalog", server.uri()));
    let store = test_store().await;

    run_discovery(&config, &store).await;
    run_detail(&config, &store).await.unwrap();
    let stats = run_relations(&config, &store).await;
    assert_eq!(stats.succeeded, 2);

    assert_eq!(store.count_relations().await.unwrap(), 2);

    // The repealed regulation was never listed: it exists as a placeholder
    let placeholder = store
        .get_document(&NaturalKey::from_str("ks:1999/44").unwrap())
        .await
        .unwrap()
        .expect("placeholder created");
    assert_eq!(placeholder.state().unwrap(), DocumentState::Discovered);
    assert_eq!(placeholder.category, None);

    let edges = store
        .relations_from(&NaturalKey::from_str("ks:04/L-123").unwrap())
        .await
        .unwrap();
    assert_eq!(edges.len(), 2);

    // Both fetched documents finished the lifecycle
    assert_eq!(
        store
            .count_documents(Some(DocumentState::Related))
            .await
            .unwrap(),
        2
    );

    // Re-running relations adds no edges
    run_relations(&config, &store).await;
    assert_eq!(store.count_relations().await.unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_promotes_placeholder_without_disturbing_edges() {
    let server = MockServer::start().await;
    let page = format!(
        r#"{{ "entries": [
            {{ "source_id": "1999/44", "title": "Found It", "document_url": "{0}/docs/found" }}
        ], "has_next": false }}"#,
        server.uri()
    );
    mount_catalog_page(&server, 1, &page).await;

    let config = fast_config(&format!("{}/catalog", server.uri()));
    let store = test_store().await;

    // A placeholder with an incoming edge, as the relations phase leaves it
    let source = NaturalKey::new("ks", "04/L-123");
    let target = NaturalKey::new("ks", "1999/44");
    let mut tx = store.begin().await.unwrap();
    tx.upsert_stub(&source, Some("laws"), None, "https://x/new")
        .await
        .unwrap();
    tx.ensure_placeholder(&target, None).await.unwrap();
    tx.upsert_relation(
        &source,
        &target,
        lexgraph_core::RelationKind::Repeals,
        None,
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    run_discovery(&config, &store).await;

    let doc = store.get_document(&target).await.unwrap().unwrap();
    assert_eq!(doc.category.as_deref(), Some("laws"));
    assert_eq!(doc.title.as_deref(), Some("Found It"));
    assert!(doc.source_url.ends_with("/docs/found"));
    assert_eq!(doc.state().unwrap(), DocumentState::Discovered);

    let edges = store.relations_from(&source).await.unwrap();
    assert_eq!(edges.len(), 1, "edge survives placeholder promotion");
}

#[tokio::test]
async fn test_discovery_keeps_earlier_pages_when_a_later_page_fails() {
    let server = MockServer::start().await;
    let page1 = format!(
        r#"{{ "entries": [
            {{ "source_id": "2003/25", "title": "Law A", "document_url": "{0}/docs/a" }}
        ], "has_next": true }}"#,
        server.uri()
    );
    mount_catalog_page(&server, 1, &page1).await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = fast_config(&format!("{}/catalog", server.uri()));
    let store = test_store().await;

    let stats = run_discovery(&config, &store).await;
    // The category counts as succeeded because page 1 was ingested
    assert_eq!(stats.succeeded, 1);
    assert_eq!(store.count_documents(None).await.unwrap(), 1);
}
