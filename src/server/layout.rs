//! Dashboard layout endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::{ApiError, AppState};
use crate::storage::{DEFAULT_LAYOUT_KEY, LayoutStore};

fn default_key() -> String {
    DEFAULT_LAYOUT_KEY.to_string()
}

/// `dashboard_id` / `name` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct LayoutParams {
    pub dashboard_id: Option<String>,
    pub name: Option<String>,
}

impl LayoutParams {
    fn dashboard_id(&self) -> &str {
        self.dashboard_id.as_deref().unwrap_or(DEFAULT_LAYOUT_KEY)
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_LAYOUT_KEY)
    }
}

/// Body of `POST /api/layout/duplicate`.
#[derive(Debug, Deserialize)]
pub struct DuplicateRequest {
    #[serde(default = "default_key")]
    pub source_dashboard_id: String,
    #[serde(default = "default_key")]
    pub source_name: String,
    #[serde(default = "default_key")]
    pub target_dashboard_id: String,
    #[serde(default = "default_key")]
    pub target_name: String,
}

/// Load a layout, or the default document when none is stored.
pub(super) async fn get_layout_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LayoutParams>,
) -> Result<Json<JsonValue>, ApiError> {
    let layout = state
        .layout_store
        .load(params.dashboard_id(), params.name())
        .await?;
    Ok(Json(layout))
}

/// Save a layout.
///
/// Keys come from the query string, then from the body, then default.
pub(super) async fn save_layout_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LayoutParams>,
    Json(body): Json<JsonValue>,
) -> Result<Json<JsonValue>, ApiError> {
    if !LayoutStore::is_valid(&body) {
        return Err(ApiError::BadRequest(
            "invalid layout configuration: panels, timestamp and version are required".to_string(),
        ));
    }
    let JsonValue::Object(config) = body else {
        return Err(ApiError::BadRequest("layout must be a JSON object".to_string()));
    };

    let from_body = |field: &str| {
        config
            .get(field)
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    };
    let dashboard_id = params
        .dashboard_id
        .clone()
        .or_else(|| from_body("dashboard_id"))
        .unwrap_or_else(default_key);
    let name = params
        .name
        .clone()
        .or_else(|| from_body("name"))
        .unwrap_or_else(default_key);

    let saved = state.layout_store.save(&dashboard_id, &name, config).await?;
    Ok(Json(json!({
        "status": "success",
        "dashboard_id": saved.dashboard_id,
        "layout_name": saved.layout_name,
        "timestamp": saved.timestamp,
    })))
}

/// Layouts of a dashboard plus the requested current layout.
pub(super) async fn list_layouts_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LayoutParams>,
) -> Result<Json<JsonValue>, ApiError> {
    let dashboard_id = params.dashboard_id();
    let layouts = state.layout_store.list(dashboard_id).await?;
    let current = state.layout_store.load(dashboard_id, params.name()).await?;

    Ok(Json(json!({
        "status": "success",
        "dashboard_id": dashboard_id,
        "current_layout": params.name(),
        "current_config": current,
        "available_layouts": layouts,
    })))
}

/// Every dashboard with active layouts.
pub(super) async fn list_dashboards_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JsonValue>, ApiError> {
    let dashboards = state.layout_store.dashboards().await?;
    Ok(Json(json!({
        "status": "success",
        "dashboards": dashboards,
    })))
}

/// Deactivate a layout.
pub(super) async fn delete_layout_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LayoutParams>,
) -> Result<Json<JsonValue>, ApiError> {
    let (dashboard_id, name) = (params.dashboard_id(), params.name());
    if !state.layout_store.delete(dashboard_id, name).await? {
        return Err(ApiError::NotFound(format!(
            "layout '{name}' not found in dashboard '{dashboard_id}'"
        )));
    }
    Ok(Json(json!({
        "status": "success",
        "message": format!("layout '{name}' removed from dashboard '{dashboard_id}'"),
    })))
}

/// Copy a layout to another dashboard or name.
pub(super) async fn duplicate_layout_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DuplicateRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let saved = state
        .layout_store
        .duplicate(
            &req.source_dashboard_id,
            &req.source_name,
            &req.target_dashboard_id,
            &req.target_name,
        )
        .await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!(
            "layout '{}' copied to '{}/{}'",
            req.source_name, saved.dashboard_id, saved.layout_name
        ),
    })))
}
