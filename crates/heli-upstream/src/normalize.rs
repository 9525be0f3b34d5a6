//! Provider-neutral raw aircraft shape and its mapping into [`FlightRecord`].
//!
//! Each provider module parses its own payload into [`RawAircraft`] and
//! declares a constant [`UnitTable`]; everything after that is shared.

use chrono::{DateTime, Utc};

use heli_core::{classify, AircraftEvidence, ClassifierPolicy, FlightRecord, FlightStatus};

pub const FEET_PER_METER: f64 = 3.28084;
pub const KNOTS_PER_METER_PER_SECOND: f64 = 1.94384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeUnit {
    Meters,
    Feet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    MetersPerSecond,
    Knots,
}

/// Units a provider reports altitude and ground speed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTable {
    pub altitude: AltitudeUnit,
    pub speed: SpeedUnit,
}

impl UnitTable {
    pub const SI: UnitTable = UnitTable {
        altitude: AltitudeUnit::Meters,
        speed: SpeedUnit::MetersPerSecond,
    };

    pub const AVIATION: UnitTable = UnitTable {
        altitude: AltitudeUnit::Feet,
        speed: SpeedUnit::Knots,
    };

    pub fn altitude_feet(&self, value: f64) -> Option<i32> {
        let feet = match self.altitude {
            AltitudeUnit::Meters => value * FEET_PER_METER,
            AltitudeUnit::Feet => value,
        };
        round_finite(feet)
    }

    pub fn speed_knots(&self, value: f64) -> Option<i32> {
        let knots = match self.speed {
            SpeedUnit::MetersPerSecond => value * KNOTS_PER_METER_PER_SECOND,
            SpeedUnit::Knots => value,
        };
        round_finite(knots)
    }
}

/// One aircraft as reported by a provider, before unit conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAircraft {
    pub icao_address: String,
    pub callsign: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub on_ground: bool,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    /// Emitter category code (`A0`..`C7`)
    pub category: Option<String>,
    pub operator: Option<String>,
    pub type_code: Option<String>,
    pub type_description: Option<String>,
    pub position_time: Option<DateTime<Utc>>,
    pub message_time: Option<DateTime<Utc>>,
}

impl RawAircraft {
    /// Finite `(lat, lon)` if the provider reported a usable position.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Map a raw aircraft into the canonical record. Returns `None` when the
/// position is missing or not finite. `likely_rotorcraft` is left `false`;
/// see [`process`].
pub fn normalize(
    raw: &RawAircraft,
    units: &UnitTable,
    fetched_at: DateTime<Utc>,
) -> Option<FlightRecord> {
    let (latitude, longitude) = raw.position()?;

    let icao_address = raw.icao_address.trim().to_lowercase();
    let callsign = non_empty(raw.callsign.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| icao_address.clone());

    let (altitude_feet, status) = if raw.on_ground {
        (Some(0), FlightStatus::Landed)
    } else {
        let altitude = raw
            .baro_altitude
            .filter(|v| v.is_finite())
            .or(raw.geo_altitude)
            .and_then(|v| units.altitude_feet(v));
        (altitude, FlightStatus::Active)
    };

    let last_seen_timestamp = match (raw.position_time, raw.message_time) {
        (Some(a), Some(b)) => a.max(b),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => fetched_at,
    };

    Some(FlightRecord {
        callsign,
        aircraft_type: non_empty(raw.type_code.as_deref())
            .map(str::to_uppercase)
            .unwrap_or_else(|| FlightRecord::UNKNOWN_TYPE.to_string()),
        latitude,
        longitude,
        altitude_feet,
        ground_speed_knots: raw.ground_speed.and_then(|v| units.speed_knots(v)),
        heading_degrees: raw
            .track
            .and_then(round_finite)
            .map(|deg| deg.rem_euclid(360)),
        status,
        operator_label: non_empty(raw.operator.as_deref()).map(str::to_string),
        last_seen_timestamp,
        icao_address,
        likely_rotorcraft: false,
    })
}

/// Drop unpositioned entries, normalize the rest and tag each with the
/// classifier's verdict under `policy`.
pub fn process(
    raws: &[RawAircraft],
    units: &UnitTable,
    policy: &ClassifierPolicy,
    fetched_at: DateTime<Utc>,
) -> Vec<FlightRecord> {
    raws.iter()
        .filter_map(|raw| {
            let mut record = normalize(raw, units, fetched_at)?;
            let evidence = AircraftEvidence {
                category: non_empty(raw.category.as_deref()),
                operator: record.operator_label.as_deref(),
                type_description: non_empty(raw.type_description.as_deref()),
                type_code: non_empty(raw.type_code.as_deref()),
                altitude_feet: record.altitude_feet,
                ground_speed_knots: record.ground_speed_knots,
            };
            let verdict = classify(&evidence, policy);
            if let Some(tier) = verdict.tier {
                tracing::trace!("{} classified as rotorcraft by {:?}", record.icao_address, tier);
            }
            record.likely_rotorcraft = verdict.likely_rotorcraft;
            Some(record)
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn round_finite(value: f64) -> Option<i32> {
    if value.is_finite() {
        Some(value.round() as i32)
    } else {
        None
    }
}
