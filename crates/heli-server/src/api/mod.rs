//! HTTP surface: live traffic and health.

pub mod live;
pub mod request_id;

use std::sync::Arc;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/heli/live", get(live::live_traffic))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::ensure_request_id))
        .layer(CorsLayer::permissive())
}

/// Always healthy; does not consult the cache or upstream.
async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}
