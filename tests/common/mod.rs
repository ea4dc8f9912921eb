#![allow(dead_code)]

use std::{future::Future, sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use stock_ledger::{
    config::AppConfig,
    db::{self, DbConfig},
    errors::ServiceError,
    events::{self, Event, EventSender},
    services::StockServices,
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const MEMORY_DB: &str = "sqlite::memory:";

/// Fresh in-memory database with the schema applied.
pub async fn test_db() -> Arc<DatabaseConnection> {
    let pool = db::establish_connection(MEMORY_DB)
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    Arc::new(pool)
}

/// Services with events drained in the background.
pub async fn test_services() -> (Arc<DatabaseConnection>, StockServices) {
    let db = test_db().await;
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(events::process_events(rx));
    let services = StockServices::new(db.clone(), Some(EventSender::new(tx)));
    (db, services)
}

/// Services whose events the test inspects itself.
pub async fn test_services_with_events() -> (StockServices, mpsc::Receiver<Event>) {
    let db = test_db().await;
    let (tx, rx) = mpsc::channel(256);
    let services = StockServices::new(db, Some(EventSender::new(tx)));
    (services, rx)
}

/// Database shared by concurrent tests. Set `STOCK_LEDGER_TEST_DATABASE_URL`
/// to run against an external server such as Postgres.
pub struct PooledDb {
    pub db: Arc<DatabaseConnection>,
    _dir: Option<TempDir>,
}

/// Services over a pool with several connections, so transactions overlap.
/// Defaults to a SQLite file in a fresh temp directory.
pub async fn pooled_services() -> (PooledDb, StockServices) {
    let (url, dir) = match std::env::var("STOCK_LEDGER_TEST_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => (url, None),
        _ => {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
            (url, Some(dir))
        }
    };

    let config = DbConfig {
        url,
        max_connections: 8,
        min_connections: 2,
        acquire_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("failed to open pooled test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");

    let db = Arc::new(pool);
    let (tx, rx) = mpsc::channel(1024);
    tokio::spawn(events::process_events(rx));
    let services = StockServices::new(db.clone(), Some(EventSender::new(tx)));
    (PooledDb { db, _dir: dir }, services)
}

/// Re-runs `op` while it fails with a transient abort, the way a caller
/// is expected to when writers collide.
pub async fn retry_transient<T, F, Fut>(mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    const MAX_ATTEMPTS: u64 = 200;

    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(1 + attempt % 7)).await;
            }
            other => return other,
        }
    }
}

pub fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn pair() -> (Uuid, Uuid) {
    (Uuid::new_v4(), Uuid::new_v4())
}

/// Helper harness for spinning up the HTTP application against an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            MEMORY_DB.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let db = test_db().await;
        let (event_tx, event_rx) = mpsc::channel(256);
        tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db, cfg, EventSender::new(event_tx));
        let router = stock_ledger::build_router(state.clone());

        Self { router, state }
    }

    /// Send a request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is not json")
}
