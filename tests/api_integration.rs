//! API Integration Tests for vitrine
//!
//! Drives the router over a real TCP listener with reqwest.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;
use vitrine::codec::{self, CompactPayload};
use vitrine::server::{AppState, create_router};
use vitrine::storage::SERVER_METRICS_TABLE;
use vitrine::{DataGenerator, ResponseCache, StorageBuilder, StorageHandles};

// =============================================================================
// Test Helpers
// =============================================================================

/// Seeded in-memory storage: 4 servers x 2 days at 12h intervals.
async fn create_test_state() -> (AppState, StorageHandles) {
    let handles = StorageBuilder::new("sqlite::memory:")
        .pool_size(2)
        .build()
        .await
        .expect("Failed to build storage");

    let records = DataGenerator::with_seed(42).generate_server_data(4, 2, 12);
    handles
        .data_store
        .insert_records(SERVER_METRICS_TABLE, &records)
        .await
        .expect("Failed to seed");

    let state = AppState {
        data_store: handles.data_store.clone(),
        layout_store: handles.layout_store.clone(),
        cache: ResponseCache::new(16),
        cache_ttl: Duration::from_secs(300),
    };

    (state, handles)
}

/// Start test server and return base URL.
async fn start_test_server() -> (String, StorageHandles) {
    let (state, handles) = create_test_state().await;
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), handles)
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_probes() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/healthz", base_url))
        .send()
        .await
        .expect("Failed to send healthz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse healthz response");
    assert_eq!(body["status"], "ok");

    let resp = client
        .get(format!("{}/readyz", base_url))
        .send()
        .await
        .expect("Failed to send readyz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse readyz response");
    assert_eq!(body["db"], "ready");

    handles.shutdown().await;
}

// =============================================================================
// Data API Tests
// =============================================================================

#[tokio::test]
async fn test_compact_cache_cycle() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/data/compact?limit=8", base_url);

    let resp = client.get(&url).send().await.expect("Failed to fetch compact");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "MISS");
    let first = resp.text().await.unwrap();

    let payload = CompactPayload::from_json(&first).expect("Invalid compact payload");
    assert_eq!(payload.len(), 8);
    assert_eq!(payload.count, Some(8));
    assert_eq!(payload.headers[0], "timestamp");
    let records = codec::decode(&payload).expect("Failed to decode");
    assert_eq!(records.len(), 8);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.headers()["x-cache"], "HIT");
    assert!(resp.headers().contains_key("x-cache-age"));
    assert_eq!(resp.text().await.unwrap(), first);

    // Clearing forces recomputation
    let resp = client
        .post(format!("{}/api/cache/clear", base_url))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["cleared_keys"], json!(["server_metrics_8"]));

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.headers()["x-cache"], "MISS");

    let stats: Value = client
        .get(format!("{}/api/cache/stats", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_entries"], 1);
    assert_eq!(stats["max_entries"], 16);

    handles.shutdown().await;
}

#[tokio::test]
async fn test_ultra_uses_epoch_seconds() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/api/data/ultra?limit=1", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let headers = body["h"].as_array().unwrap();
    let ts = headers.iter().position(|h| h == "timestamp").unwrap();
    // 2025-01-01T00:00:00Z
    assert_eq!(body["d"][0][ts], 1_735_689_600);

    handles.shutdown().await;
}

#[tokio::test]
async fn test_filtered_and_metadata() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!(
            "{}/api/data/filtered?server_name=SRV-002&server_name=SRV-004",
            base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let payload: CompactPayload = serde_json::from_value(body).unwrap();
    // 2 servers x 4 samples
    assert_eq!(payload.len(), 8);
    let name = payload.headers.iter().position(|h| h == "server_name").unwrap();
    assert!(
        payload
            .rows
            .iter()
            .all(|row| row[name] == "SRV-002" || row[name] == "SRV-004")
    );

    let body: Value = client
        .get(format!("{}/api/metadata", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["table_name"], SERVER_METRICS_TABLE);
    assert_eq!(body["total_columns"], body["columns"].as_array().unwrap().len());

    handles.shutdown().await;
}

#[tokio::test]
async fn test_rejects_unknown_table_and_column() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/data/compact?table=sqlite_master", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("sqlite_master"));

    let resp = client
        .get(format!("{}/api/data/filtered?name%3B--=1", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    handles.shutdown().await;
}

// =============================================================================
// Layout API Tests
// =============================================================================

#[tokio::test]
async fn test_layout_lifecycle() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let layout = json!({
        "panels": [{ "id": "cpu", "type": "line" }],
        "timestamp": "2025-01-01T00:00:00",
        "version": "1.0"
    });

    let resp = client
        .post(format!("{}/api/layout?dashboard_id=ops&name=main", base_url))
        .json(&layout)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let loaded: Value = client
        .get(format!("{}/api/layout?dashboard_id=ops&name=main", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(loaded["panels"][0]["id"], "cpu");

    let listing: Value = client
        .get(format!("{}/api/layouts?dashboard_id=ops&name=main", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["current_layout"], "main");
    assert_eq!(listing["available_layouts"][0]["name"], "main");

    let resp = client
        .delete(format!("{}/api/layout?dashboard_id=ops&name=main", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let dashboards: Value = client
        .get(format!("{}/api/dashboards", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dashboards["dashboards"], json!([]));

    handles.shutdown().await;
}

// =============================================================================
// In-process Router Tests
// =============================================================================

#[tokio::test]
async fn test_router_without_listener() {
    let (state, handles) = create_test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/data?limit=3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let rows: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 3);
    assert_eq!(rows[0]["server_name"], "SRV-001");

    handles.shutdown().await;
}
