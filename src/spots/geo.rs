//! Great-circle helpers for proximity search

use super::model::GeoPoint;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometres
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Coarse rectangle enclosing every point within a radius, used as an index prefilter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    /// `None` when the circle touches a pole or wraps the antimeridian
    pub lng_range: Option<(f64, f64)>,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let d_lat = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let min_lat = center.latitude - d_lat;
        let max_lat = center.latitude + d_lat;

        let lng_range = if min_lat <= -90.0 || max_lat >= 90.0 {
            None
        } else {
            let d_lng = (radius_km / (EARTH_RADIUS_KM * center.latitude.to_radians().cos()))
                .to_degrees();
            let min_lng = center.longitude - d_lng;
            let max_lng = center.longitude + d_lng;
            if min_lng < -180.0 || max_lng > 180.0 {
                None
            } else {
                Some((min_lng, max_lng))
            }
        };

        Self {
            min_lat: min_lat.max(-90.0),
            max_lat: max_lat.min(90.0),
            lng_range,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        let lat_ok = point.latitude >= self.min_lat && point.latitude <= self.max_lat;
        let lng_ok = self
            .lng_range
            .map_or(true, |(min, max)| point.longitude >= min && point.longitude <= max);
        lat_ok && lng_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            longitude,
            latitude,
        }
    }

    #[test]
    fn test_zero_distance() {
        let p = point(40.7128, -74.0060);
        assert!(haversine_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn test_known_distance() {
        // New York City to Philadelphia, roughly 130 km
        let nyc = point(40.7128, -74.0060);
        let phl = point(39.9526, -75.1652);
        let d = haversine_km(nyc, phl);
        assert!((d - 129.6).abs() < 1.5, "got {}", d);
        assert!((haversine_km(phl, nyc) - d).abs() < 1e-9);
    }

    #[test]
    fn test_box_contains_points_in_radius() {
        let center = point(51.5074, -0.1278);
        let bbox = BoundingBox::around(center, 5.0);
        let inside = point(51.53, -0.10);
        assert!(haversine_km(center, inside) < 5.0);
        assert!(bbox.contains(inside));
        assert!(!bbox.contains(point(52.5, -0.1278)));
    }

    #[test]
    fn test_box_near_antimeridian_drops_longitude_filter() {
        let bbox = BoundingBox::around(point(0.0, 179.99), 10.0);
        assert!(bbox.lng_range.is_none());
        assert!(bbox.contains(point(0.0, -179.99)));
    }

    #[test]
    fn test_box_near_pole_is_clamped() {
        let bbox = BoundingBox::around(point(89.99, 10.0), 50.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert!(bbox.lng_range.is_none());
    }
}
