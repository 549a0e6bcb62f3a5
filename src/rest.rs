// Copyright 2026 Gridwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! REST boundary layer over the acquisition engine.
//!
//! Thin translation only: handlers parse parameters, call the service,
//! and shape responses. When a fresh fetch fails with a transient or
//! auth error and an expired snapshot is still cached, the snapshot is
//! served with `"stale": true` rather than failing the request.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::DEFAULT_QUERY_SIZE;
use crate::error::EngineError;
use crate::model::{BoundingBox, OutageSnapshot, QueryKey};
use crate::service::OutageDataService;

pub type AppState = Arc<OutageDataService>;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/outages", get(outages))
        .route("/outages/summary", get(summary))
        .route("/outages/bbox", get(outages_bbox))
        .route("/outages/geojson", get(geojson))
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn start(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("REST API listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct OutagesParams {
    size: Option<usize>,
    use_cache: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct BboxParams {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
    size: Option<usize>,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = state.health_check().await;
    Json(json!({
        "status": if status.reachable { "ok" } else { "degraded" },
        "upstream_reachable": status.reachable,
        "credential_present": status.credential_present,
    }))
}

async fn outages(
    State(state): State<AppState>,
    Query(params): Query<OutagesParams>,
) -> Response {
    let size = params.size.unwrap_or(DEFAULT_QUERY_SIZE);
    let use_cache = params.use_cache.unwrap_or(true);
    let key = QueryKey::full(size);

    match state.fetch_all(size, use_cache).await {
        Ok(snapshot) => snapshot_response(&snapshot, false),
        Err(e) => degraded_response(&state, &key, e).await,
    }
}

async fn summary(
    State(state): State<AppState>,
    Query(params): Query<OutagesParams>,
) -> Response {
    let size = params.size.unwrap_or(DEFAULT_QUERY_SIZE);
    let use_cache = params.use_cache.unwrap_or(true);
    let key = QueryKey::full(size);

    match state.fetch_all(size, use_cache).await {
        Ok(snapshot) => Json(json!({ "summary": snapshot.summary, "stale": false })).into_response(),
        Err(e) => match state.cached_snapshot(&key, true).await {
            Some((snapshot, stale)) => {
                Json(json!({ "summary": snapshot.summary, "stale": stale })).into_response()
            }
            None => error_response(e),
        },
    }
}

async fn outages_bbox(
    State(state): State<AppState>,
    Query(params): Query<BboxParams>,
) -> Response {
    let bbox = BoundingBox {
        north: params.north,
        south: params.south,
        east: params.east,
        west: params.west,
    };
    if bbox.north <= bbox.south || bbox.east <= bbox.west {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "bounding box is inverted or degenerate" })),
        )
            .into_response();
    }

    let size = params.size.unwrap_or(DEFAULT_QUERY_SIZE);
    let key = QueryKey::bounded(&bbox, size);

    match state.fetch_by_bounding_box(bbox, size).await {
        Ok(snapshot) => snapshot_response(&snapshot, false),
        Err(e) => degraded_response(&state, &key, e).await,
    }
}

async fn geojson(
    State(state): State<AppState>,
    Query(params): Query<OutagesParams>,
) -> Response {
    let size = params.size.unwrap_or(DEFAULT_QUERY_SIZE);
    let use_cache = params.use_cache.unwrap_or(true);
    let key = QueryKey::full(size);

    match state.fetch_all(size, use_cache).await {
        Ok(snapshot) => Json(to_geojson(&snapshot)).into_response(),
        Err(e) => match state.cached_snapshot(&key, true).await {
            Some((snapshot, _)) => Json(to_geojson(&snapshot)).into_response(),
            None => error_response(e),
        },
    }
}

async fn invalidate_cache(State(state): State<AppState>) -> Json<Value> {
    state.invalidate_cache().await;
    Json(json!({ "invalidated": true }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let cfg = state.config();
    Json(json!({
        "cache_entries": state.cache_len().await,
        "cache_ttl_s": cfg.cache_ttl.as_secs(),
        "rate_limit_ms": cfg.rate_limit_delay.as_millis() as u64,
        "base_url": cfg.base_url,
    }))
}

fn snapshot_response(snapshot: &OutageSnapshot, stale: bool) -> Response {
    let mut body = match serde_json::to_value(snapshot) {
        Ok(Value::Object(map)) => map,
        _ => return error_response(EngineError::malformed("snapshot failed to serialize")),
    };
    body.insert("stale".to_string(), Value::Bool(stale));
    Json(Value::Object(body)).into_response()
}

/// Fresh fetch failed: fall back to any cached snapshot (expired
/// included) with the stale marker, otherwise surface the error.
async fn degraded_response(state: &AppState, key: &QueryKey, err: EngineError) -> Response {
    if let Some((snapshot, stale)) = state.cached_snapshot(key, true).await {
        warn!("serving cached snapshot (stale: {stale}) after fetch failure: {err}");
        return snapshot_response(&snapshot, stale);
    }
    error_response(err)
}

fn error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::MalformedResponse(_) | EngineError::Http { .. } => StatusCode::BAD_GATEWAY,
        EngineError::Auth { .. }
        | EngineError::RateLimited { .. }
        | EngineError::Network { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Render a snapshot as a GeoJSON `FeatureCollection`.
///
/// GeoJSON positions are `[lon, lat]` and rings must close, so the first
/// vertex is repeated at the end of each ring.
fn to_geojson(snapshot: &OutageSnapshot) -> Value {
    let features: Vec<Value> = snapshot
        .outages
        .iter()
        .map(|o| {
            let mut ring: Vec<Value> = o
                .geometry
                .vertices
                .iter()
                .map(|(lat, lon)| json!([lon, lat]))
                .collect();
            if let Some(first) = ring.first().cloned() {
                ring.push(first);
            }
            json!({
                "type": "Feature",
                "geometry": { "type": "Polygon", "coordinates": [ring] },
                "properties": {
                    "incident_id": o.incident_id,
                    "customers_affected": o.customers_affected,
                    "status": o.status,
                    "reason": o.reason,
                    "last_updated": o.last_updated,
                    "estimated_restoration": o.estimated_restoration,
                    "provenance": o.geometry.provenance,
                }
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
        "properties": {
            "generated": snapshot.summary.last_updated,
            "total_outages": snapshot.summary.total_outages,
            "total_customers_affected": snapshot.summary.total_customers_affected,
            "data_source": snapshot.summary.data_source,
        }
    })
}
