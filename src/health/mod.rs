/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - database connectivity and overall status
 * - Liveness check (`/health/live`) - process is up, no dependencies touched
 * - Version (`/health/version`) - build information
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: HashMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    pub async fn check(&self) -> HealthInfo {
        let database = match crate::db::check_connection(&self.db_pool).await {
            Ok(()) => HealthDetail {
                status: HealthStatus::Up,
                message: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                error!("Database health check failed: {}", e);
                HealthDetail {
                    status: HealthStatus::Down,
                    message: Some(e.response_message()),
                    timestamp: Utc::now(),
                }
            }
        };

        let status = database.status.clone();
        let mut details = HashMap::new();
        details.insert("database".to_string(), database);

        HealthInfo {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.uptime(),
            details,
        }
    }
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health check endpoint; 503 when the database is unreachable.
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Health check endpoint called");

    let health = state.check().await;
    let status_code = match health.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

/// Creates router with health check endpoints
pub fn health_routes(db_pool: Arc<DatabaseConnection>) -> Router {
    let health_state = Arc::new(HealthState::new(db_pool));

    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(health_state)
}
