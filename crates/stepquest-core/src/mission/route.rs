//! Route recording.
//!
//! A continuous GPS stream is thinned to points at least
//! [`MIN_DISTANCE_METERS`] apart before it is stored on the mission.

use super::types::RouteCoordinate;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const MIN_DISTANCE_METERS: f64 = 5.0;

/// Great-circle distance between two points in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total length of a recorded route in kilometers.
pub fn route_length_km(points: &[RouteCoordinate]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_m(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum::<f64>()
        / 1000.0
}

/// Drops fixes closer than the minimum distance to the last accepted one.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    min_distance_m: f64,
    last: Option<(f64, f64)>,
}

impl Default for RouteFilter {
    fn default() -> Self {
        Self::new(MIN_DISTANCE_METERS)
    }
}

impl RouteFilter {
    pub fn new(min_distance_m: f64) -> Self {
        Self {
            min_distance_m,
            last: None,
        }
    }

    /// Returns true and remembers the point when it should be recorded.
    pub fn accept(&mut self, latitude: f64, longitude: f64) -> bool {
        if let Some((lat, lon)) = self.last {
            if haversine_m(lat, lon, latitude, longitude) < self.min_distance_m {
                return false;
            }
        }
        self.last = Some((latitude, longitude));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
