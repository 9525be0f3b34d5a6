//! Core data models shared by the adapters, the cache and the HTTP surface.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundingBoxError {
    #[error("expected 4 comma-separated values, got {0}")]
    WrongArity(usize),
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("bounding box values must be finite")]
    NonFinite,
    #[error("south {south} is greater than north {north}")]
    Inverted { south: f64, north: f64 },
}

/// Viewport rectangle in degrees. `south <= north` always holds; longitudes are
/// taken as given (antimeridian wrap is not handled).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    south: f64,
    north: f64,
    west: f64,
    east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Result<Self, BoundingBoxError> {
        if ![south, north, west, east].iter().all(|v| v.is_finite()) {
            return Err(BoundingBoxError::NonFinite);
        }
        if south > north {
            return Err(BoundingBoxError::Inverted { south, north });
        }
        Ok(Self {
            south,
            north,
            west,
            east,
        })
    }

    /// Caller guarantees finite values with `south <= north`.
    pub(crate) fn from_ordered(south: f64, north: f64, west: f64, east: f64) -> Self {
        debug_assert!(south <= north);
        Self {
            south,
            north,
            west,
            east,
        }
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    /// Arithmetic midpoint of the corners as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }

    /// Corners as `(lat, lon)`: NE, NW, SE, SW.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.north, self.east),
            (self.north, self.west),
            (self.south, self.east),
            (self.south, self.west),
        ]
    }

    /// Inclusive point containment.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.south >= self.south
            && other.north <= self.north
            && other.west >= self.west
            && other.east <= self.east
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::from_ordered(
            self.south.min(other.south),
            self.north.max(other.north),
            self.west.min(other.west),
            self.east.max(other.east),
        )
    }

    /// `[south, north, west, east]`, the order used on the wire.
    pub fn to_array(&self) -> [f64; 4] {
        [self.south, self.north, self.west, self.east]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.south, self.north, self.west, self.east)
    }
}

/// Parses `south,north,west,east`.
impl FromStr for BoundingBox {
    type Err = BoundingBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BoundingBoxError::WrongArity(parts.len()));
        }
        let mut values = [0.0_f64; 4];
        for (slot, raw) in values.iter_mut().zip(&parts) {
            *slot = raw
                .parse::<f64>()
                .map_err(|_| BoundingBoxError::NotANumber(raw.to_string()))?;
        }
        BoundingBox::new(values[0], values[1], values[2], values[3])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    #[default]
    Active,
    /// Provider reported the aircraft on the ground
    Landed,
}

/// Canonical, provider-independent aircraft record.
///
/// Field names and units (feet, knots, degrees, ISO-8601 UTC) are the client
/// wire contract and stay the same whichever provider is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    pub callsign: String,
    /// ICAO type designator, `"other"` when unknown
    pub aircraft_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_feet: Option<i32>,
    pub ground_speed_knots: Option<i32>,
    pub heading_degrees: Option<i32>,
    pub status: FlightStatus,
    pub operator_label: Option<String>,
    pub last_seen_timestamp: DateTime<Utc>,
    pub icao_address: String,
    pub likely_rotorcraft: bool,
}

impl FlightRecord {
    pub const UNKNOWN_TYPE: &'static str = "other";
}
