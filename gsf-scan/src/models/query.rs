//! Scan requests and location queries

use gsf_common::Coordinates;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// What to search: a free-text place or a circular region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationQuery {
    /// Free-text place name, e.g. "Rochester, MN"
    Place { name: String },
    /// Circle around a center point
    Region {
        center_lat: f64,
        center_lng: f64,
        radius_meters: f64,
    },
}

impl LocationQuery {
    pub fn place(name: impl Into<String>) -> Self {
        LocationQuery::Place { name: name.into() }
    }

    pub fn region(center: Coordinates, radius_meters: f64) -> Self {
        LocationQuery::Region {
            center_lat: center.latitude,
            center_lng: center.longitude,
            radius_meters,
        }
    }

    /// Reject empty place names, bad coordinates, non-positive radii
    pub fn validate(&self) -> Result<(), ScanError> {
        match self {
            LocationQuery::Place { name } => {
                if name.trim().is_empty() {
                    return Err(ScanError::InvalidQuery("Location must not be empty".to_string()));
                }
            }
            LocationQuery::Region {
                center_lat,
                center_lng,
                radius_meters,
            } => {
                Coordinates::new(*center_lat, *center_lng)
                    .map_err(|e| ScanError::InvalidQuery(e.to_string()))?;
                if !radius_meters.is_finite() || *radius_meters <= 0.0 {
                    return Err(ScanError::InvalidQuery(format!(
                        "Radius must be positive, got {}",
                        radius_meters
                    )));
                }
            }
        }
        Ok(())
    }

    /// `location` string sent to the discovery service
    pub fn location_string(&self) -> String {
        match self {
            LocationQuery::Place { name } => name.trim().to_string(),
            LocationQuery::Region {
                center_lat,
                center_lng,
                ..
            } => format!("{},{}", center_lat, center_lng),
        }
    }

    /// Search radius: the region's own radius, or `default_meters` for places
    pub fn radius_meters(&self, default_meters: f64) -> f64 {
        match self {
            LocationQuery::Place { .. } => default_meters,
            LocationQuery::Region { radius_meters, .. } => *radius_meters,
        }
    }

    /// Short description for logs and events
    pub fn describe(&self) -> String {
        match self {
            LocationQuery::Place { name } => name.trim().to_string(),
            LocationQuery::Region {
                center_lat,
                center_lng,
                radius_meters,
            } => format!("{:.5},{:.5} r={}m", center_lat, center_lng, radius_meters),
        }
    }
}

/// Operator-supplied context passed to capacity estimation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilityContext {
    /// Known facility or utility name
    pub name: String,
    #[serde(default)]
    pub notes: String,
}

/// A scan request as accepted by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub query: LocationQuery,
    #[serde(default)]
    pub context: Option<UtilityContext>,
    /// Overrides the configured `max_results`
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl ScanRequest {
    pub fn new(query: LocationQuery) -> Self {
        Self {
            query,
            context: None,
            max_results: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_query() {
        let q = LocationQuery::place("  Rochester, MN ");
        assert!(q.validate().is_ok());
        assert_eq!(q.location_string(), "Rochester, MN");
        assert_eq!(q.radius_meters(25_000.0), 25_000.0);
    }

    #[test]
    fn test_empty_place_rejected() {
        assert!(LocationQuery::place("   ").validate().is_err());
    }

    #[test]
    fn test_region_query() {
        let q = LocationQuery::region(Coordinates { latitude: 44.02, longitude: -92.46 }, 8000.0);
        assert!(q.validate().is_ok());
        assert_eq!(q.location_string(), "44.02,-92.46");
        assert_eq!(q.radius_meters(25_000.0), 8000.0);
    }

    #[test]
    fn test_invalid_region_rejected() {
        let bad_lat = LocationQuery::Region {
            center_lat: 123.0,
            center_lng: 0.0,
            radius_meters: 10.0,
        };
        assert!(bad_lat.validate().is_err());

        let bad_radius = LocationQuery::Region {
            center_lat: 10.0,
            center_lng: 0.0,
            radius_meters: 0.0,
        };
        assert!(bad_radius.validate().is_err());
    }

    #[test]
    fn test_query_json_shape() {
        let q: LocationQuery =
            serde_json::from_str(r#"{"kind":"place","name":"Duluth"}"#).unwrap();
        assert_eq!(q, LocationQuery::place("Duluth"));

        let r: LocationQuery = serde_json::from_str(
            r#"{"kind":"region","center_lat":46.7,"center_lng":-92.1,"radius_meters":5000}"#,
        )
        .unwrap();
        assert_eq!(r.radius_meters(1.0), 5000.0);
    }
}
