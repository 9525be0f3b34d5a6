//! The adapter contract every upstream provider implements.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use heli_core::{box_to_center_radius, BoundingBox, CenterRadius, ClassifierPolicy, FlightRecord};

use crate::backoff::RetryPolicy;
use crate::error::UpstreamError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// One upstream fetch cycle: normalized, classified records plus when they were fetched.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<FlightRecord>,
}

/// Query shapes a provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCapability {
    BoundingBox,
    CenterRadius,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryShape {
    Box(BoundingBox),
    Circle(CenterRadius),
}

impl QueryCapability {
    pub fn shape(&self, region: &BoundingBox) -> QueryShape {
        match self {
            QueryCapability::BoundingBox => QueryShape::Box(*region),
            QueryCapability::CenterRadius => QueryShape::Circle(box_to_center_radius(region)),
        }
    }
}

impl QueryShape {
    /// The box itself, or the box circumscribing the circle.
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            QueryShape::Box(region) => *region,
            QueryShape::Circle(circle) => circle.bounding_box(),
        }
    }

    /// The circle itself, or the circle covering the box.
    pub fn circle(&self) -> CenterRadius {
        match self {
            QueryShape::Box(region) => box_to_center_radius(region),
            QueryShape::Circle(circle) => *circle,
        }
    }
}

pub trait UpstreamAdapter: Send + Sync {
    /// Short provider name for logs and responses.
    fn name(&self) -> &'static str;

    fn capability(&self) -> QueryCapability;

    fn policy(&self) -> ClassifierPolicy;

    /// Run one provider query.
    fn fetch_shape(&self, shape: QueryShape) -> BoxFuture<'_, Result<Snapshot, UpstreamError>>;

    /// Fetch every aircraft the provider reports for `region`, shaped the way
    /// the provider accepts queries.
    fn fetch<'a>(&'a self, region: &'a BoundingBox) -> BoxFuture<'a, Result<Snapshot, UpstreamError>> {
        self.fetch_shape(self.capability().shape(region))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenSky,
    AdsbFi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenSky => "opensky",
            ProviderKind::AdsbFi => "adsbfi",
        }
    }

    /// OpenSky only exposes an emitter category, so it is judged on that alone.
    pub fn default_policy(&self) -> ClassifierPolicy {
        match self {
            ProviderKind::OpenSky => ClassifierPolicy::strict(),
            ProviderKind::AdsbFi => ClassifierPolicy::full(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opensky" | "opensky-network" => Ok(ProviderKind::OpenSky),
            "adsbfi" | "adsb.fi" | "adsb-fi" => Ok(ProviderKind::AdsbFi),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// Transport settings shared by all adapters.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: concat!("heli-live/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    /// Client with the call timeout applied; exceeding it aborts the request.
    pub fn build_client(&self) -> Result<Client, UpstreamError> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|err| UpstreamError::Config(format!("failed to build HTTP client: {err}")))
    }
}

/// Send a request and decode a JSON body, mapping failures onto [`UpstreamError`].
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, UpstreamError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::from_status(status, &body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| UpstreamError::Decode(err.to_string()))
}
