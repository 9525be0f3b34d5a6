//! adsb.fi open data adapter (center + radius queries, no auth).
//!
//! Aircraft objects follow the readsb JSON layout: feet, knots, and
//! `alt_baro` is either a number or the string `"ground"`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;

use heli_core::{CenterRadius, ClassifierPolicy};

use crate::adapter::{
    send_json, HttpSettings, QueryCapability, QueryShape, Snapshot, UpstreamAdapter,
};
use crate::backoff::{retry_with_backoff, RetryPolicy};
use crate::error::UpstreamError;
use crate::normalize::{process, RawAircraft, UnitTable};

pub const DEFAULT_API_URL: &str = "https://opendata.adsb.fi/api";

/// Largest radius the provider accepts.
pub const MAX_RADIUS_NM: u32 = 250;

/// adsb.fi reports feet and knots already.
pub const UNITS: UnitTable = UnitTable::AVIATION;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BaroAltitude {
    Feet(f64),
    Label(String),
}

#[derive(Debug, Clone, Deserialize)]
struct AdsbFiAircraft {
    hex: String,
    #[serde(default)]
    flight: Option<String>,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default, rename = "ownOp")]
    own_op: Option<String>,
    #[serde(default)]
    alt_baro: Option<BaroAltitude>,
    #[serde(default)]
    alt_geom: Option<f64>,
    #[serde(default)]
    gs: Option<f64>,
    #[serde(default)]
    track: Option<f64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    /// Seconds since any message was received
    #[serde(default)]
    seen: Option<f64>,
    /// Seconds since the position was last updated
    #[serde(default)]
    seen_pos: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AdsbFiResponse {
    #[serde(default, alias = "aircraft")]
    ac: Vec<AdsbFiAircraft>,
    /// Server time in milliseconds
    #[serde(default)]
    now: Option<f64>,
}

pub struct AdsbFiAdapter {
    api_url: String,
    policy: ClassifierPolicy,
    client: Client,
    retry: RetryPolicy,
}

impl AdsbFiAdapter {
    pub fn new(api_url: impl Into<String>, http: &HttpSettings) -> Result<Self, UpstreamError> {
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            policy: ClassifierPolicy::full(),
            client: http.build_client()?,
            retry: http.retry,
        })
    }

    pub fn with_policy(mut self, policy: ClassifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn query_url(&self, circle: &CenterRadius) -> String {
        let radius = if circle.radius_nm > MAX_RADIUS_NM {
            tracing::warn!(
                "adsb.fi radius {}nm exceeds provider limit, clamping to {}nm",
                circle.radius_nm,
                MAX_RADIUS_NM
            );
            MAX_RADIUS_NM
        } else {
            circle.radius_nm.max(1)
        };
        format!(
            "{}/v2/lat/{:.4}/lon/{:.4}/dist/{}",
            self.api_url, circle.center_lat, circle.center_lon, radius
        )
    }

    async fn fetch_snapshot(&self, shape: QueryShape) -> Result<Snapshot, UpstreamError> {
        let circle = shape.circle();
        let url = self.query_url(&circle);

        let response: AdsbFiResponse = retry_with_backoff(&self.retry, UpstreamError::is_retryable, |_| {
            send_json(self.client.get(&url))
        })
        .await?;
        let fetched_at = Utc::now();

        let reference = response
            .now
            .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
            .unwrap_or(fetched_at);
        let raws: Vec<RawAircraft> = response
            .ac
            .into_iter()
            .map(|aircraft| to_raw(aircraft, reference))
            .collect();
        let records = process(&raws, &UNITS, &self.policy, fetched_at);
        tracing::debug!(
            "adsb.fi returned {} aircraft, {} usable within {}nm of ({:.4}, {:.4})",
            raws.len(),
            records.len(),
            circle.radius_nm,
            circle.center_lat,
            circle.center_lon
        );

        Ok(Snapshot {
            fetched_at,
            records,
        })
    }
}

impl UpstreamAdapter for AdsbFiAdapter {
    fn name(&self) -> &'static str {
        "adsbfi"
    }

    fn capability(&self) -> QueryCapability {
        QueryCapability::CenterRadius
    }

    fn policy(&self) -> ClassifierPolicy {
        self.policy
    }

    fn fetch_shape(&self, shape: QueryShape) -> BoxFuture<'_, Result<Snapshot, UpstreamError>> {
        Box::pin(self.fetch_snapshot(shape))
    }
}

fn to_raw(aircraft: AdsbFiAircraft, reference: DateTime<Utc>) -> RawAircraft {
    // Absurd ages from a misbehaving feed are dropped rather than overflowing.
    let ago = |secs: Option<f64>| {
        secs.filter(|s| s.is_finite() && *s >= 0.0)
            .and_then(|s| ChronoDuration::try_milliseconds((s * 1000.0) as i64))
            .and_then(|age| reference.checked_sub_signed(age))
    };

    let (baro_altitude, on_ground) = match aircraft.alt_baro {
        Some(BaroAltitude::Feet(feet)) => (Some(feet), false),
        Some(BaroAltitude::Label(label)) => (None, label.eq_ignore_ascii_case("ground")),
        None => (None, false),
    };

    RawAircraft {
        icao_address: aircraft.hex.trim_start_matches('~').to_string(),
        callsign: aircraft.flight,
        latitude: aircraft.lat,
        longitude: aircraft.lon,
        baro_altitude,
        geo_altitude: aircraft.alt_geom,
        on_ground,
        ground_speed: aircraft.gs,
        track: aircraft.track,
        category: aircraft.category,
        operator: aircraft.own_op,
        type_code: aircraft.t,
        type_description: aircraft.desc,
        position_time: ago(aircraft.seen_pos),
        message_time: ago(aircraft.seen),
    }
}
