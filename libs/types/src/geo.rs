//! Geographic value types
//!
//! `Location` is a validated latitude/longitude pair; distances are
//! great-circle miles via the haversine formula.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Earth radius in miles for haversine distance.
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Validation failure for a latitude/longitude pair
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Latitude out of range [-90, 90]: {0}")]
    InvalidLatitude(f64),

    #[error("Longitude out of range [-180, 180]: {0}")]
    InvalidLongitude(f64),
}

/// A validated point on the globe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    /// Create a location, rejecting out-of-range coordinates
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
            return Err(GeoError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance to another location, in miles
    pub fn haversine_miles(&self, other: &Location) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let dphi = (other.lat - self.lat).to_radians();
        let dlambda = (other.lon - self.lon).to_radians();

        let a = (dphi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_MILES * c
    }
}
