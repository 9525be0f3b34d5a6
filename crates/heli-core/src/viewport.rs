//! Clip a cached region's flights down to the exact requested viewport.

use crate::models::{BoundingBox, FlightRecord};

/// Records whose position lies inside `bbox` (inclusive), in their original order.
pub fn clip(records: &[FlightRecord], bbox: &BoundingBox) -> Vec<FlightRecord> {
    records
        .iter()
        .filter(|record| bbox.contains(record.latitude, record.longitude))
        .cloned()
        .collect()
}
