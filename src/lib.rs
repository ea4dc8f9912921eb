//! Stock Ledger Library
//!
//! Per-(SKU, location) inventory tracking: an append-only movement ledger,
//! reservations against on-hand stock, and audit reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;

use axum::Router;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use handlers::StockHandlerState;
use services::StockServices;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: StockServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = StockServices::new(db.clone(), Some(event_sender.clone()));
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

impl StockHandlerState for AppState {
    fn stock_services(&self) -> &StockServices {
        &self.services
    }

    fn default_page_size(&self) -> u64 {
        u64::from(self.config.api_default_page_size)
    }

    fn max_page_size(&self) -> u64 {
        u64::from(self.config.api_max_page_size)
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API routes: the stock API under `/api/v1/stock` and health checks
/// under `/health`, wrapped in request-id, tracing and timeout layers.
pub fn build_router(state: AppState) -> Router {
    let health = health::health_routes(state.db.clone());

    Router::new()
        .nest(
            "/api/v1/stock",
            handlers::stock_routes::<AppState>().with_state(state),
        )
        .nest("/health", health)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
