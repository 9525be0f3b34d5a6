//! OpenSky Network adapter (`/states/all`, bounding-box queries).
//!
//! Supports anonymous access, HTTP basic auth and OAuth2 client credentials.
//! State vectors are positional JSON arrays in SI units.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use heli_core::{BoundingBox, ClassifierPolicy};

use crate::adapter::{
    send_json, HttpSettings, QueryCapability, QueryShape, Snapshot, UpstreamAdapter,
};
use crate::backoff::{retry_with_backoff, RetryPolicy};
use crate::error::UpstreamError;
use crate::normalize::{process, RawAircraft, UnitTable};
use crate::token::TokenStore;

pub const DEFAULT_API_URL: &str = "https://opensky-network.org/api";
pub const DEFAULT_TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

/// OpenSky reports metres and metres per second.
pub const UNITS: UnitTable = UnitTable::SI;

pub enum OpenSkyAuth {
    Anonymous,
    Basic { username: String, password: String },
    OAuth(Arc<TokenStore>),
    /// An auth mode was selected without its credentials. Reported on first fetch.
    Unconfigured(String),
}

impl OpenSkyAuth {
    pub fn mode(&self) -> &'static str {
        match self {
            OpenSkyAuth::Anonymous => "anonymous",
            OpenSkyAuth::Basic { .. } => "basic",
            OpenSkyAuth::OAuth(_) => "oauth",
            OpenSkyAuth::Unconfigured(_) => "unconfigured",
        }
    }
}

enum Credential {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    states: Option<Vec<Vec<Value>>>,
}

pub struct OpenSkyAdapter {
    api_url: String,
    auth: OpenSkyAuth,
    policy: ClassifierPolicy,
    client: Client,
    retry: RetryPolicy,
}

impl OpenSkyAdapter {
    pub fn new(
        api_url: impl Into<String>,
        auth: OpenSkyAuth,
        http: &HttpSettings,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth,
            policy: ClassifierPolicy::strict(),
            client: http.build_client()?,
            retry: http.retry,
        })
    }

    pub fn with_policy(mut self, policy: ClassifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn credential(&self) -> Result<Credential, UpstreamError> {
        match &self.auth {
            OpenSkyAuth::Anonymous => Ok(Credential::None),
            OpenSkyAuth::Basic { username, password } => Ok(Credential::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            OpenSkyAuth::OAuth(store) => Ok(Credential::Bearer(store.token().await?)),
            OpenSkyAuth::Unconfigured(detail) => Err(UpstreamError::Config(detail.clone())),
        }
    }

    async fn request_states(
        &self,
        region: &BoundingBox,
        credential: &Credential,
    ) -> Result<StatesResponse, UpstreamError> {
        let url = format!("{}/states/all", self.api_url);
        let mut request = self.client.get(&url).query(&[
            ("lamin", region.south().to_string()),
            ("lomin", region.west().to_string()),
            ("lamax", region.north().to_string()),
            ("lomax", region.east().to_string()),
            ("extended", "1".to_string()),
        ]);
        request = match credential {
            Credential::None => request,
            Credential::Basic { username, password } => request.basic_auth(username, Some(password)),
            Credential::Bearer(token) => request.bearer_auth(token),
        };
        send_json(request).await
    }

    /// One attempt, with a single forced token refresh if the bearer token is refused.
    async fn fetch_states(&self, region: &BoundingBox) -> Result<StatesResponse, UpstreamError> {
        let credential = self.credential().await?;
        match self.request_states(region, &credential).await {
            Err(err) if err.is_auth() => {
                let (OpenSkyAuth::OAuth(store), Credential::Bearer(rejected)) =
                    (&self.auth, &credential)
                else {
                    return Err(err);
                };
                tracing::warn!("OpenSky rejected bearer token, refreshing once: {}", err);
                let fresh = store.force_refresh(rejected).await?;
                self.request_states(region, &Credential::Bearer(fresh)).await
            }
            other => other,
        }
    }

    async fn fetch_snapshot(&self, shape: QueryShape) -> Result<Snapshot, UpstreamError> {
        let region = shape.bounding_box();
        let response = retry_with_backoff(&self.retry, UpstreamError::is_retryable, |_| {
            self.fetch_states(&region)
        })
        .await?;
        let fetched_at = Utc::now();

        let raws: Vec<RawAircraft> = response
            .states
            .unwrap_or_default()
            .iter()
            .filter_map(|state| parse_state_vector(state))
            .collect();
        let records = process(&raws, &UNITS, &self.policy, fetched_at);
        tracing::debug!(
            "OpenSky returned {} state vectors, {} usable for {}",
            raws.len(),
            records.len(),
            region
        );

        Ok(Snapshot {
            fetched_at,
            records,
        })
    }
}

impl UpstreamAdapter for OpenSkyAdapter {
    fn name(&self) -> &'static str {
        "opensky"
    }

    fn capability(&self) -> QueryCapability {
        QueryCapability::BoundingBox
    }

    fn policy(&self) -> ClassifierPolicy {
        self.policy
    }

    fn fetch_shape(&self, shape: QueryShape) -> BoxFuture<'_, Result<Snapshot, UpstreamError>> {
        Box::pin(self.fetch_snapshot(shape))
    }
}

// State vector indices (extended=1 adds the category at 17).
const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_TIME_POSITION: usize = 3;
const IDX_LAST_CONTACT: usize = 4;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_BARO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_TRUE_TRACK: usize = 10;
const IDX_GEO_ALTITUDE: usize = 13;
const IDX_CATEGORY: usize = 17;

/// Parse one state vector. Entries without an ICAO address are skipped;
/// position checks happen later, in normalization.
pub fn parse_state_vector(state: &[Value]) -> Option<RawAircraft> {
    let icao_address = state.get(IDX_ICAO24)?.as_str()?.trim().to_string();
    if icao_address.is_empty() {
        return None;
    }

    let number = |idx: usize| state.get(idx).and_then(Value::as_f64);
    let timestamp = |idx: usize| {
        state
            .get(idx)
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    };

    Some(RawAircraft {
        icao_address,
        callsign: state
            .get(IDX_CALLSIGN)
            .and_then(Value::as_str)
            .map(str::to_string),
        latitude: number(IDX_LATITUDE),
        longitude: number(IDX_LONGITUDE),
        baro_altitude: number(IDX_BARO_ALTITUDE),
        geo_altitude: number(IDX_GEO_ALTITUDE),
        on_ground: state
            .get(IDX_ON_GROUND)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        ground_speed: number(IDX_VELOCITY),
        track: number(IDX_TRUE_TRACK),
        category: state
            .get(IDX_CATEGORY)
            .and_then(Value::as_u64)
            .and_then(emitter_category),
        operator: None,
        type_code: None,
        type_description: None,
        position_time: timestamp(IDX_TIME_POSITION),
        message_time: timestamp(IDX_LAST_CONTACT),
    })
}

/// OpenSky's numeric aircraft category as an ADS-B emitter category code.
pub fn emitter_category(category: u64) -> Option<String> {
    let code = match category {
        2 => "A1",
        3 => "A2",
        4 => "A3",
        5 => "A4",
        6 => "A5",
        7 => "A6",
        8 => "A7",
        9 => "B1",
        10 => "B2",
        11 => "B3",
        12 => "B4",
        14 => "B6",
        15 => "B7",
        16 => "C1",
        17 => "C2",
        18 => "C3",
        19 => "C4",
        20 => "C5",
        // 0, 1: no information; 13: reserved
        _ => return None,
    };
    Some(code.to_string())
}
