//! Web server module for vitrine.
//!
//! Provides the JSON API consumed by the dashboard front end: row data in
//! full, compact and ultra encodings, table metadata, layout persistence and
//! cache administration.

mod admin;
mod data;
mod error;
mod layout;

pub use data::{COMPACT_DEFAULT_LIMIT, DEFAULT_LIMIT, DataParams, MetadataResponse};
pub use error::ApiError;
pub use layout::{DuplicateRequest, LayoutParams};

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::cache::ResponseCache;
use crate::storage::{DataStore, LayoutStore};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub data_store: DataStore,
    pub layout_store: LayoutStore,
    pub cache: ResponseCache,
    /// Lifetime of cached compact and ultra payloads.
    pub cache_ttl: Duration,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/data", get(data::data_handler))
        .route("/api/data/compact", get(data::compact_handler))
        .route("/api/data/ultra", get(data::ultra_handler))
        .route("/api/data/filtered", get(data::filtered_handler))
        .route("/api/metadata", get(data::metadata_handler))
        .route(
            "/api/layout",
            get(layout::get_layout_handler)
                .post(layout::save_layout_handler)
                .delete(layout::delete_layout_handler),
        )
        .route("/api/layout/duplicate", post(layout::duplicate_layout_handler))
        .route("/api/layouts", get(layout::list_layouts_handler))
        .route("/api/dashboards", get(layout::list_dashboards_handler))
        .route("/api/cache/clear", post(admin::clear_cache_handler))
        .route("/api/cache/stats", get(admin::cache_stats_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks the database pool.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.data_store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}
