//! Data endpoints: full rows, cached compact payloads, filtered payloads and
//! table metadata.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, AppState};
use crate::cache::{CacheLookup, CacheStatus};
use crate::codec::{self, Metadata, TOTAL_RECORDS_KEY};
use crate::storage::{
    FilterSpec, FilterValue, Record, SERVER_METRICS_TABLE, SelectQuery, StorageError, Value,
};

/// Default row limit of `/api/data` and `/api/data/filtered`.
pub const DEFAULT_LIMIT: i64 = 1_000;

/// Default row limit of the cached compact endpoints.
pub const COMPACT_DEFAULT_LIMIT: i64 = 100_000;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const X_CACHE_AGE: HeaderName = HeaderName::from_static("x-cache-age");

/// Query parameters of the data endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DataParams {
    pub limit: Option<String>,
    pub table: Option<String>,
    pub cache: Option<String>,
}

impl DataParams {
    fn table(&self) -> &str {
        self.table
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(SERVER_METRICS_TABLE)
    }

    fn use_cache(&self) -> bool {
        self.cache
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case("true"))
    }
}

/// Payload flavor of the cached endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Compact,
    Ultra,
}

impl Variant {
    fn cache_key(self, table: &str, limit: i64) -> String {
        match self {
            Self::Compact => format!("{table}_{limit}"),
            Self::Ultra => format!("{table}_{limit}_ultra"),
        }
    }
}

/// Parse an optional `limit` parameter.
///
/// Positivity is checked by the query builder.
fn parse_limit(raw: Option<&str>, default: i64) -> Result<i64, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("limit must be an integer, got '{s}'"))),
    }
}

fn compact_metadata(table: &str, total_records: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("table".to_string(), json!(table));
    metadata.insert(TOTAL_RECORDS_KEY.to_string(), json!(total_records));
    metadata.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
    metadata.insert("format".to_string(), json!("compact"));
    metadata
}

fn json_response(payload: Bytes) -> Response {
    (
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        payload,
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Full rows as an array of objects.
pub(super) async fn data_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_LIMIT)?;
    let records = state
        .data_store
        .select(params.table(), None, Some(limit))
        .await?;
    Ok(Json(records))
}

/// Compact payload, cached.
pub(super) async fn compact_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
) -> Result<Response, ApiError> {
    serve_cached(&state, &params, Variant::Compact).await
}

/// Compact payload with epoch-second timestamps, cached separately.
pub(super) async fn ultra_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
) -> Result<Response, ApiError> {
    serve_cached(&state, &params, Variant::Ultra).await
}

async fn serve_cached(
    state: &AppState,
    params: &DataParams,
    variant: Variant,
) -> Result<Response, ApiError> {
    let table = params.table();
    let limit = parse_limit(params.limit.as_deref(), COMPACT_DEFAULT_LIMIT)?;
    // Reject bad input before touching the cache.
    let query = state
        .data_store
        .query_builder()
        .build_select(table, None, Some(limit))
        .map_err(StorageError::from)?;

    let compute = || encode_query(state, &query, table, variant);

    let lookup = if params.use_cache() {
        let key = variant.cache_key(table, limit);
        state
            .cache
            .get_or_compute(&key, state.cache_ttl, compute)
            .await?
    } else {
        CacheLookup {
            payload: compute().await?,
            status: CacheStatus::Miss,
            age: std::time::Duration::ZERO,
        }
    };

    let mut response = json_response(lookup.payload);
    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(lookup.status.into()));
    if lookup.status == CacheStatus::Hit {
        headers.insert(X_CACHE_AGE, HeaderValue::from(lookup.age.as_secs()));
    }
    Ok(response)
}

async fn encode_query(
    state: &AppState,
    query: &SelectQuery,
    table: &str,
    variant: Variant,
) -> Result<Bytes, ApiError> {
    let records = state.data_store.fetch(query).await?;

    let payload = match variant {
        Variant::Compact => {
            codec::encode(&records, Some(compact_metadata(table, records.len())))?
        }
        Variant::Ultra => {
            let mut metadata = Metadata::new();
            metadata.insert(TOTAL_RECORDS_KEY.to_string(), json!(records.len()));
            codec::encode_ultra(&records, Some(metadata))?
        }
    };

    Ok(Bytes::from(payload.to_json()?))
}

/// Compact payload filtered by arbitrary `column=value` parameters.
///
/// Values are coerced with [`Value::coerce`]; a repeated parameter becomes an
/// `IN` list.
pub(super) async fn filtered_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let mut limit = None;
    let mut table = None;
    let mut filters = FilterSpec::new();

    for (key, raw) in pairs {
        match key.as_str() {
            "limit" => limit = Some(raw),
            "table" => table = Some(raw),
            _ => add_filter(&mut filters, key, Value::coerce(&raw)),
        }
    }

    let table = table
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| SERVER_METRICS_TABLE.to_string());
    let limit = parse_limit(limit.as_deref(), DEFAULT_LIMIT)?;
    let filters = (!filters.is_empty()).then_some(filters);

    let records = state
        .data_store
        .select(&table, filters.as_ref(), Some(limit))
        .await?;

    let payload = codec::encode(&records, Some(compact_metadata(&table, records.len())))?;
    Ok(json_response(Bytes::from(payload.to_json()?)))
}

fn add_filter(filters: &mut FilterSpec, key: String, value: Value) {
    let Some(existing) = filters.get_mut(&key) else {
        filters.insert(key, FilterValue::Eq(value));
        return;
    };
    *existing = match std::mem::replace(existing, FilterValue::In(Vec::new())) {
        FilterValue::Eq(first) => FilterValue::In(vec![first, value]),
        FilterValue::In(mut values) => {
            values.push(value);
            FilterValue::In(values)
        }
    };
}

/// Response of `/api/metadata`.
#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub table_name: String,
    pub columns: Vec<String>,
    pub sample_record: Record,
    pub total_columns: usize,
}

/// Column names of a table plus one sample row.
pub(super) async fn metadata_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let table = params.table();
    let columns = state.data_store.column_names(table)?;
    let sample_record = state
        .data_store
        .select(table, None, Some(1))
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    Ok(Json(MetadataResponse {
        table_name: table.to_string(),
        total_columns: columns.len(),
        columns,
        sample_record,
    }))
}
