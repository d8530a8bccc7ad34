//! Geospatial distance helpers
//!
//! Two metrics are provided:
//! - [`planar_distance_degrees`]: Euclidean distance in raw degree space. Cheap and
//!   deliberately approximate; the clustering radius (default 0.1°, roughly 11 km at
//!   mid latitudes) is calibrated against this metric.
//! - [`haversine_km`]: great-circle distance, used for proximity filtering and export.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS84 latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build validated coordinates
    ///
    /// Rejects non-finite values and values outside ±90 / ±180.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coords = Self { latitude, longitude };
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(Error::InvalidCoordinates { latitude, longitude })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// "lat,lng" form used by the discovery service and map links
    pub fn to_query_string(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    /// External map link for "view on map" actions
    pub fn map_link(&self) -> String {
        format!("https://maps.google.com/?q={}", self.to_query_string())
    }
}

/// Planar Euclidean distance between two points, in degrees
pub fn planar_distance_degrees(a: &Coordinates, b: &Coordinates) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlng = a.longitude - b.longitude;
    (dlat * dlat + dlng * dlng).sqrt()
}

/// Great-circle distance between two points, in kilometres
pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}
