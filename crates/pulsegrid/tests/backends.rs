//! Cross-backend contract tests.
//!
//! Every storage backend is interchangeable behind `MetricStorage`; the
//! same observable scenario must hold against each one.

use std::sync::Arc;

use pulsegrid::{MetricError, MetricStorage, PersistMode, StoreConfig, select_backend};
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn spawn_run(store: &Arc<dyn MetricStorage>) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = store.clone();
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });
    (shutdown_tx, handle)
}

fn sqlite_url(dir: &tempfile::TempDir) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("metrics.db").display()
    )
}

/// The submit/read scenario every backend must satisfy.
async fn exercise(store: Arc<dyn MetricStorage>) {
    store.apply_update("gauge", "Alloc", "234.1").await.unwrap();
    assert_eq!(store.gauge("Alloc").await.unwrap(), 234.1);

    store.apply_update("counter", "PollCount", "3").await.unwrap();
    store.apply_update("counter", "PollCount", "4").await.unwrap();
    assert_eq!(store.counter("PollCount").await.unwrap(), 7);

    assert!(matches!(
        store.gauge("missing").await,
        Err(MetricError::NotFound(_))
    ));

    // Gauge and counter namespaces are independent.
    store.apply_update("gauge", "x", "1.0").await.unwrap();
    store.apply_update("counter", "x", "1").await.unwrap();
    assert_eq!(store.gauge("x").await.unwrap(), 1.0);
    assert_eq!(store.counter("x").await.unwrap(), 1);

    let snapshot = store.snapshot().await.unwrap();
    assert_eq!(snapshot.gauges.len(), 2);
    assert_eq!(snapshot.counters.len(), 2);

    assert!(store.probe().await);
}

#[tokio::test]
async fn memory_backend_scenario() {
    let store: Arc<dyn MetricStorage> =
        Arc::from(select_backend(&StoreConfig::in_memory()).await.unwrap());
    let _guard = spawn_run(&store);
    exercise(store).await;
}

#[tokio::test]
async fn file_backend_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig::file_backed(
        dir.path().join("metrics.json"),
        PersistMode::Synchronous,
        false,
    );
    let store: Arc<dyn MetricStorage> = Arc::from(select_backend(&cfg).await.unwrap());
    let _guard = spawn_run(&store);
    exercise(store).await;
}

#[tokio::test]
async fn sql_backend_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig::relational(sqlite_url(&dir));
    let store: Arc<dyn MetricStorage> = Arc::from(select_backend(&cfg).await.unwrap());
    let _guard = spawn_run(&store);
    exercise(store).await;
}

#[tokio::test]
async fn file_backend_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    {
        let cfg = StoreConfig::file_backed(&path, PersistMode::Synchronous, true);
        let store: Arc<dyn MetricStorage> = Arc::from(select_backend(&cfg).await.unwrap());
        let (shutdown_tx, handle) = spawn_run(&store);
        store.apply_update("counter", "PollCount", "7").await.unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    let cfg = StoreConfig::file_backed(&path, PersistMode::Synchronous, true);
    let store: Arc<dyn MetricStorage> = Arc::from(select_backend(&cfg).await.unwrap());
    let _guard = spawn_run(&store);
    assert_eq!(store.counter("PollCount").await.unwrap(), 7);
}

#[tokio::test]
async fn sql_backend_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig::relational(sqlite_url(&dir));

    {
        let store: Arc<dyn MetricStorage> = Arc::from(select_backend(&cfg).await.unwrap());
        let (shutdown_tx, handle) = spawn_run(&store);
        store.apply_update("gauge", "Alloc", "234.1").await.unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    let store: Arc<dyn MetricStorage> = Arc::from(select_backend(&cfg).await.unwrap());
    let _guard = spawn_run(&store);
    assert_eq!(store.gauge("Alloc").await.unwrap(), 234.1);
}

#[tokio::test]
async fn durable_backends_are_mutually_exclusive() {
    let mut cfg = StoreConfig::relational("sqlite://unused.db");
    cfg.snapshot_path = Some("/tmp/unused.json".into());

    let err = select_backend(&cfg).await.unwrap_err();
    assert!(matches!(err, pulsegrid::StartupError::Config(_)));
}

#[tokio::test]
async fn signed_pipeline_is_uniform_across_backends() {
    // A payload signed for one key must be rejected identically by an
    // in-memory and a relational backend.
    let payload = br#"{"id":"Alloc","type":"gauge","value":234.1,"hash":"bogus"}"#;

    let memory: Arc<dyn MetricStorage> = Arc::from(
        select_backend(&StoreConfig::in_memory().with_signing_key("secret"))
            .await
            .unwrap(),
    );
    let _guard = spawn_run(&memory);

    let dir = tempfile::tempdir().unwrap();
    let sql: Arc<dyn MetricStorage> = Arc::from(
        select_backend(&StoreConfig::relational(sqlite_url(&dir)).with_signing_key("secret"))
            .await
            .unwrap(),
    );

    for store in [&memory, &sql] {
        assert!(matches!(
            store.apply_signed_update(payload).await,
            Err(MetricError::AuthenticationFailure(_))
        ));
    }
}
