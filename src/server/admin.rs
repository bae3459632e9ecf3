//! Cache administration endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde_json::{Value as JsonValue, json};

use super::AppState;
use crate::cache::CacheStats;

/// Clear cached payloads.
///
/// Repeated `key` parameters select entries; without any, everything is
/// cleared.
pub(super) async fn clear_cache_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<JsonValue> {
    let keys: Vec<String> = pairs
        .into_iter()
        .filter(|(k, _)| k == "key")
        .map(|(_, v)| v)
        .collect();

    let cleared = if keys.is_empty() {
        state.cache.clear(None)
    } else {
        state.cache.clear(Some(&keys))
    };

    Json(json!({
        "status": "success",
        "message": format!("cache cleared, {} entries removed", cleared.len()),
        "cleared_keys": cleared,
    }))
}

/// Per-entry cache statistics.
pub(super) async fn cache_stats_handler(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats())
}
