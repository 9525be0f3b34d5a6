//! Region quantization for cache sharing between nearby viewports.
//!
//! A viewport's center is snapped to a grid of `precision` decimal degrees.
//! The snapped point is the [`RegionKey`]; the area fetched for that key is a
//! fixed-size cell around it, independent of the requested extents.

use std::fmt;

use crate::geo::{km_per_deg_lat, MIN_LON_SCALE};
use crate::models::BoundingBox;

/// Quantized viewport center. Equal keys share one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionKey {
    lat_steps: i64,
    lon_steps: i64,
    precision: u32,
}

impl RegionKey {
    fn scale(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }

    /// Snapped center as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        let scale = self.scale();
        (
            self.lat_steps as f64 / scale,
            self.lon_steps as f64 / scale,
        )
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lat, lon) = self.center();
        let p = self.precision as usize;
        write!(f, "{lat:.p$},{lon:.p$}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionQuantizer {
    precision: u32,
    cell_radius_nm: f64,
}

impl RegionQuantizer {
    /// `precision` is clamped to 0..=6 decimals; `cell_radius_nm` to at least 1 NM.
    pub fn new(precision: u32, cell_radius_nm: f64) -> Self {
        let cell_radius_nm = if cell_radius_nm.is_finite() {
            cell_radius_nm.max(1.0)
        } else {
            1.0
        };
        Self {
            precision: precision.min(6),
            cell_radius_nm,
        }
    }

    pub fn key(&self, bbox: &BoundingBox) -> RegionKey {
        let scale = 10f64.powi(self.precision as i32);
        let (lat, lon) = bbox.center();
        RegionKey {
            lat_steps: (lat * scale).round() as i64,
            lon_steps: (lon * scale).round() as i64,
            precision: self.precision,
        }
    }

    /// Box inscribed in the circle of `cell_radius_nm` around the key's center,
    /// so a circle query for the cell stays close to the configured radius.
    pub fn cell(&self, key: &RegionKey) -> BoundingBox {
        let (lat, lon) = key.center();
        let half_side_km = self.cell_radius_nm * crate::geo::KM_PER_NAUTICAL_MILE
            / std::f64::consts::SQRT_2;
        let half_lat = half_side_km / km_per_deg_lat();
        let half_lon = half_lat / lat.to_radians().cos().max(MIN_LON_SCALE);

        // Clamping is monotonic, so south <= north still holds.
        BoundingBox::from_ordered(
            (lat - half_lat).clamp(-90.0, 90.0),
            (lat + half_lat).clamp(-90.0, 90.0),
            (lon - half_lon).clamp(-180.0, 180.0),
            (lon + half_lon).clamp(-180.0, 180.0),
        )
    }

    /// The key's cell, grown to cover `region` when the viewport is wider than the cell.
    pub fn cell_covering(&self, key: &RegionKey, region: &BoundingBox) -> BoundingBox {
        let cell = self.cell(key);
        if cell.contains_box(region) {
            cell
        } else {
            cell.union(region)
        }
    }
}
