//! HTTP surface for stock snapshots
//!
//! # Routes
//!
//! - `GET /stock/{ticker}?history_period=<period>&include_news=<bool>` - snapshot
//! - `GET /health` - liveness check
//!
//! Every snapshot answer is HTTP 200; failures are reported in the body as
//! `{"error": "..."}`.

use axum::Json;
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use stock_snapshot::{SnapshotQuery, SnapshotService, StockResponse};

/// Body returned when building a snapshot panics
pub const PANIC_MESSAGE: &str = "Internal error while building snapshot";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Create the Axum application with all routes
pub fn router(service: SnapshotService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stock/{ticker}", get(stock_snapshot))
        // Middleware
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Liveness check: `GET /health`
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Snapshot of one ticker: `GET /stock/{ticker}`
async fn stock_snapshot(
    State(service): State<SnapshotService>,
    Path(ticker): Path<String>,
    query: Result<Query<SnapshotQuery>, QueryRejection>,
) -> Json<StockResponse> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            warn!(ticker, error = %rejection, "rejected query string");
            return Json(StockResponse::failure(rejection.body_text()));
        }
    };

    Json(service.snapshot(&ticker, query).await)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "snapshot handler panicked");

    Json(StockResponse::failure(PANIC_MESSAGE)).into_response()
}
