//! Geographic positions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point from latitude and longitude
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in metres (haversine)
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// A single device position fix supplied by the location provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    /// Position of the fix
    pub point: GeoPoint,
    /// Horizontal accuracy in metres, if the provider reports one
    pub accuracy_m: Option<f64>,
    /// When the fix was taken
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    /// Sample taken now at the given coordinates
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            point: GeoPoint::new(latitude, longitude),
            accuracy_m: None,
            captured_at: Utc::now(),
        }
    }

    /// Attach a horizontal accuracy
    #[must_use]
    pub const fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Latitude shortcut
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.point.latitude
    }

    /// Longitude shortcut
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.point.longitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_identical_points_is_zero() {
        let p = GeoPoint::new(51.1079, 17.0385);
        assert!(p.distance_to(&p) < 1e-6);
    }

    #[test]
    fn small_offsets_straddle_the_reporting_threshold() {
        let origin = GeoPoint::new(51.1, 17.0);
        // ~3.3 m north
        let near = GeoPoint::new(51.100_03, 17.0);
        // ~11 m north
        let far = GeoPoint::new(51.1001, 17.0);
        assert!(origin.distance_to(&near) < 5.0);
        assert!(origin.distance_to(&far) > 5.0);
    }

    #[test]
    fn known_city_distance() {
        // Wroclaw to Lublin, roughly 385 km
        let wroclaw = GeoPoint::new(51.1079, 17.0385);
        let lublin = GeoPoint::new(51.2465, 22.5684);
        let km = wroclaw.distance_to(&lublin) / 1000.0;
        assert!((370.0..400.0).contains(&km), "got {km}");
    }
}
