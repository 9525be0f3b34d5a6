//! Live rotorcraft traffic for a viewport.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use heli_core::{clip, BoundingBox, FlightRecord};
use heli_upstream::UpstreamError;

use crate::state::AppState;

/// Either `bbox=south,north,west,east` or the four `lamin/lamax/lomin/lomax` values.
#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    pub bbox: Option<String>,
    pub lamin: Option<String>,
    pub lamax: Option<String>,
    pub lomin: Option<String>,
    pub lomax: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LiveResponse {
    pub ok: bool,
    /// Unix seconds of the upstream fetch that produced the flights
    pub time: i64,
    pub count: usize,
    pub bbox: [f64; 4],
    pub flights: Vec<FlightRecord>,
    pub provider: &'static str,
    pub cached: bool,
}

/// Requested viewport, or `None` if neither query shape parses.
pub fn parse_viewport(query: &LiveQuery) -> Option<BoundingBox> {
    if let Some(raw) = query.bbox.as_deref() {
        match raw.parse::<BoundingBox>() {
            Ok(bbox) => return Some(bbox),
            Err(err) => tracing::debug!("Ignoring bbox '{}': {}", raw, err),
        }
    }

    let number = |value: &Option<String>| value.as_deref().and_then(|v| v.trim().parse::<f64>().ok());
    let (south, north, west, east) = (
        number(&query.lamin)?,
        number(&query.lamax)?,
        number(&query.lomin)?,
        number(&query.lomax)?,
    );
    BoundingBox::new(south, north, west, east)
        .map_err(|err| tracing::debug!("Ignoring lamin/lamax/lomin/lomax: {}", err))
        .ok()
}

pub fn resolve_bbox(query: Option<&LiveQuery>, fallback: BoundingBox) -> BoundingBox {
    query.and_then(parse_viewport).unwrap_or(fallback)
}

/// GET /api/heli/live
pub async fn live_traffic(
    State(state): State<Arc<AppState>>,
    query: Option<Query<LiveQuery>>,
) -> Response {
    let bbox = resolve_bbox(query.as_ref().map(|Query(q)| q), state.default_bbox());

    // Detached so a client disconnect does not abort the upstream fetch.
    let cache = state.cache().clone();
    let lookup = match tokio::spawn(async move { cache.get(&bbox).await }).await {
        Ok(Ok(lookup)) => lookup,
        Ok(Err(err)) => return upstream_failure(&err),
        Err(err) => {
            tracing::error!("Live traffic fetch task failed: {}", err);
            return server_error();
        }
    };

    let flights = clip(&lookup.entry.records, &bbox);
    tracing::debug!(
        "Serving {} of {} flights for {} (region {}, cached={})",
        flights.len(),
        lookup.entry.records.len(),
        bbox,
        lookup.entry.region_key,
        lookup.hit
    );

    Json(LiveResponse {
        ok: true,
        time: lookup.entry.fetched_at.timestamp(),
        count: flights.len(),
        bbox: bbox.to_array(),
        flights,
        provider: state.cache().adapter_name(),
        cached: lookup.hit,
    })
    .into_response()
}

fn upstream_failure(err: &UpstreamError) -> Response {
    tracing::warn!("Live traffic upstream failure: {}", err);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "ok": false,
            "error": "upstream_failure",
            "detail": err.to_string(),
        })),
    )
        .into_response()
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "ok": false,
            "error": "server_error",
        })),
    )
        .into_response()
}
