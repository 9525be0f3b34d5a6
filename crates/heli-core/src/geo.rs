//! Great-circle math for turning viewports into provider query shapes.

use crate::models::BoundingBox;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_PER_NAUTICAL_MILE: f64 = 1.852;

/// Cos(lat) floor so boxes near the poles do not explode in longitude.
pub(crate) const MIN_LON_SCALE: f64 = 0.01;

/// Kilometers per degree of latitude on the spherical model.
pub fn km_per_deg_lat() -> f64 {
    EARTH_RADIUS_KM * std::f64::consts::PI / 180.0
}

/// Great-circle distance between two points in kilometers (haversine, spherical Earth).
pub fn distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let phi1 = lat_a.to_radians();
    let phi2 = lat_b.to_radians();
    let dphi = (lat_b - lat_a).to_radians();
    let dlambda = (lon_b - lon_a).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Center point plus covering radius for providers that only take circle queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterRadius {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_nm: u32,
}

impl CenterRadius {
    /// Smallest lat/lon box containing the circle, clamped to valid coordinates.
    pub fn bounding_box(&self) -> BoundingBox {
        let radius_km = self.radius_nm as f64 * KM_PER_NAUTICAL_MILE;
        let half_lat = radius_km / km_per_deg_lat();
        // Widest longitude reached by a spherical cap.
        let reach = (radius_km / EARTH_RADIUS_KM).sin();
        let cos_lat = self.center_lat.to_radians().cos().max(MIN_LON_SCALE);
        let half_lon = if reach >= cos_lat {
            180.0
        } else {
            (reach / cos_lat).asin().to_degrees()
        };
        BoundingBox::from_ordered(
            (self.center_lat - half_lat).clamp(-90.0, 90.0),
            (self.center_lat + half_lat).clamp(-90.0, 90.0),
            (self.center_lon - half_lon).clamp(-180.0, 180.0),
            (self.center_lon + half_lon).clamp(-180.0, 180.0),
        )
    }
}

/// Convert a bounding box into a circle that fully covers it.
///
/// The center is the arithmetic midpoint of the corners. The radius is the
/// distance to the farthest corner, rounded up to whole nautical miles. On a
/// sphere the equatorward corners sit slightly farther from the midpoint than
/// the poleward ones, so every corner is measured rather than only the
/// north-east one.
pub fn box_to_center_radius(bbox: &BoundingBox) -> CenterRadius {
    let (center_lat, center_lon) = bbox.center();

    let farthest_km = bbox
        .corners()
        .iter()
        .map(|(lat, lon)| distance_km(center_lat, center_lon, *lat, *lon))
        .fold(0.0_f64, f64::max);

    CenterRadius {
        center_lat,
        center_lon,
        radius_nm: (farthest_km / KM_PER_NAUTICAL_MILE).ceil() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(south: f64, north: f64, west: f64, east: f64) -> BoundingBox {
        BoundingBox::new(south, north, west, east).expect("valid bbox")
    }

    #[test]
    fn distance_one_degree_latitude() {
        // ~111km between these points (1 degree latitude)
        let dist = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111.19).abs() < 0.1);
    }

    #[test]
    fn distance_same_point_is_zero() {
        let dist = distance_km(51.0, -114.05, 51.0, -114.05);
        assert!(dist < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = distance_km(51.0, -114.05, 49.0, -110.0);
        let ba = distance_km(49.0, -110.0, 51.0, -114.05);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn center_is_corner_midpoint() {
        let circle = box_to_center_radius(&bbox(50.70, 51.30, -114.40, -113.70));
        assert!((circle.center_lat - 51.0).abs() < 1e-9);
        assert!((circle.center_lon + 114.05).abs() < 1e-9);
    }

    #[test]
    fn circle_covers_every_corner() {
        let boxes = [
            bbox(50.70, 51.30, -114.40, -113.70),
            bbox(-34.2, -33.5, 150.8, 151.6),
            bbox(0.0, 0.0, 0.0, 0.0),
            bbox(-1.0, 1.0, -1.0, 1.0),
            bbox(60.0, 70.0, 5.0, 30.0),
            bbox(-70.0, -60.0, -30.0, -5.0),
        ];

        for b in boxes {
            let circle = box_to_center_radius(&b);
            for (lat, lon) in b.corners() {
                let d_nm = distance_km(circle.center_lat, circle.center_lon, lat, lon)
                    / KM_PER_NAUTICAL_MILE;
                assert!(
                    d_nm <= circle.radius_nm as f64,
                    "corner ({lat},{lon}) at {d_nm}nm outside radius {}",
                    circle.radius_nm
                );
            }
        }
    }

    #[test]
    fn circle_box_contains_the_original_box() {
        for b in [
            bbox(50.70, 51.30, -114.40, -113.70),
            bbox(-34.2, -33.5, 150.8, 151.6),
            bbox(49.0, 53.0, -117.0, -111.0),
        ] {
            let around = box_to_center_radius(&b).bounding_box();
            assert!(around.contains_box(&b), "{around} does not contain {b}");
        }
    }

    #[test]
    fn radius_rounds_up() {
        // ~0.3 degree half-height box: distance is fractional, result must be ceiling.
        let b = bbox(50.70, 51.30, -114.40, -113.70);
        let circle = box_to_center_radius(&b);
        let (lat, lon) = (50.70, -114.40);
        let exact = distance_km(51.0, -114.05, lat, lon) / KM_PER_NAUTICAL_MILE;
        assert_eq!(circle.radius_nm, exact.ceil() as u32);
    }
}
