//! Site record model
//!
//! A [`SiteRecord`] is one candidate infrastructure location (substation, idle
//! facility) together with its evolving analysis result. The analysis lifecycle is
//!
//! ```text
//! pending → analyzing → completed
//!                    └→ failed
//! ```
//!
//! Nothing leaves `completed` or `failed`. Capacity data is only ever present on a
//! `completed` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::Coordinates;
use crate::{Error, Result};

/// Site analysis lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        matches!(
            (self, next),
            (AnalysisStatus::Pending, AnalysisStatus::Analyzing)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Completed)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Failed)
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AnalysisStatus::Pending),
            "analyzing" => Ok(AnalysisStatus::Analyzing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown analysis status: {}", other))),
        }
    }
}

/// Where a site's coordinates came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatesSource {
    /// Returned by the remote discovery service
    Discovery,
    /// Entered by an operator as an ad-hoc site
    Manual,
}

impl CoordinatesSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatesSource::Discovery => "discovery",
            CoordinatesSource::Manual => "manual",
        }
    }
}

impl FromStr for CoordinatesSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discovery" => Ok(CoordinatesSource::Discovery),
            "manual" => Ok(CoordinatesSource::Manual),
            other => Err(Error::InvalidInput(format!("Unknown coordinates source: {}", other))),
        }
    }
}

/// Expected power capacity for a site (MW / MVA)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityEstimate {
    pub min: f64,
    pub max: f64,
    /// Confidence on a 0.0 - 1.0 scale
    pub confidence: f64,
}

impl CapacityEstimate {
    /// Confidence on the 0 - 100 scale used by map aggregates
    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }
}

/// Ownership and electrical details attached by enrichment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interconnection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_factor: Option<f64>,
    /// Name of the service that produced the capacity estimate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_source: Option<String>,
}

/// Identity of a physical site for persistence: (name, latitude, longitude)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteKey {
    name: String,
    latitude_bits: u64,
    longitude_bits: u64,
}

impl SiteKey {
    pub fn new(name: &str, coords: &Coordinates) -> Self {
        // `+ 0.0` folds -0.0 into 0.0 so both spell the same key
        Self {
            name: name.to_string(),
            latitude_bits: (coords.latitude + 0.0).to_bits(),
            longitude_bits: (coords.longitude + 0.0).to_bits(),
        }
    }
}

/// A candidate site plus its analysis state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub coordinates: Option<Coordinates>,
    pub capacity_estimate: Option<CapacityEstimate>,
    pub details: Option<SiteDetails>,
    pub analysis_status: AnalysisStatus,
    pub coordinates_source: CoordinatesSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub stored_at: Option<DateTime<Utc>>,
}

impl SiteRecord {
    /// New pending record returned by the discovery service
    pub fn discovered(id: String, name: String, address: String, coordinates: Coordinates) -> Self {
        Self {
            id,
            name,
            address,
            coordinates: Some(coordinates),
            capacity_estimate: None,
            details: None,
            analysis_status: AnalysisStatus::Pending,
            coordinates_source: CoordinatesSource::Discovery,
            failure_reason: None,
            stored_at: None,
        }
    }

    /// New pending record entered by hand, with a locally generated id
    pub fn ad_hoc(name: String, address: String, coordinates: Option<Coordinates>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            address,
            coordinates,
            capacity_estimate: None,
            details: None,
            analysis_status: AnalysisStatus::Pending,
            coordinates_source: CoordinatesSource::Manual,
            failure_reason: None,
            stored_at: None,
        }
    }

    /// Persistence identity; None when the site has no coordinates
    pub fn natural_key(&self) -> Option<SiteKey> {
        self.coordinates.as_ref().map(|c| SiteKey::new(&self.name, c))
    }

    pub fn map_link(&self) -> Option<String> {
        self.coordinates.as_ref().map(Coordinates::map_link)
    }

    /// pending → analyzing
    pub fn begin_analysis(&mut self) -> Result<()> {
        self.transition(AnalysisStatus::Analyzing)
    }

    /// analyzing → completed, attaching the enrichment result
    pub fn complete(&mut self, estimate: CapacityEstimate, details: SiteDetails) -> Result<()> {
        self.transition(AnalysisStatus::Completed)?;
        self.capacity_estimate = Some(estimate);
        self.details = Some(details);
        self.failure_reason = None;
        Ok(())
    }

    /// analyzing → failed, dropping any partial enrichment data
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(AnalysisStatus::Failed)?;
        self.capacity_estimate = None;
        self.details = None;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: AnalysisStatus) -> Result<()> {
        if !self.analysis_status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.analysis_status.to_string(),
                to: next.to_string(),
            });
        }
        self.analysis_status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, lat: f64, lng: f64) -> SiteRecord {
        SiteRecord::discovered(
            format!("id-{}", name),
            name.to_string(),
            "100 Main St, Springfield, IL 62701, USA".to_string(),
            Coordinates { latitude: lat, longitude: lng },
        )
    }

    fn estimate(max: f64) -> CapacityEstimate {
        CapacityEstimate { min: max / 2.0, max, confidence: 0.9 }
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut s = site("North Sub", 39.8, -89.6);
        assert_eq!(s.analysis_status, AnalysisStatus::Pending);

        s.begin_analysis().unwrap();
        assert_eq!(s.analysis_status, AnalysisStatus::Analyzing);

        s.complete(estimate(120.0), SiteDetails::default()).unwrap();
        assert_eq!(s.analysis_status, AnalysisStatus::Completed);
        assert_eq!(s.capacity_estimate.unwrap().max, 120.0);
    }

    #[test]
    fn test_fail_drops_partial_data() {
        let mut s = site("North Sub", 39.8, -89.6);
        s.begin_analysis().unwrap();
        s.capacity_estimate = Some(estimate(50.0));
        s.fail("timeout").unwrap();

        assert_eq!(s.analysis_status, AnalysisStatus::Failed);
        assert!(s.capacity_estimate.is_none());
        assert!(s.details.is_none());
        assert_eq!(s.failure_reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut s = site("North Sub", 39.8, -89.6);
        s.begin_analysis().unwrap();
        s.fail("boom").unwrap();

        assert!(s.begin_analysis().is_err());
        assert!(s.complete(estimate(10.0), SiteDetails::default()).is_err());
        assert_eq!(s.analysis_status, AnalysisStatus::Failed);
        assert!(s.capacity_estimate.is_none());
    }

    #[test]
    fn test_cannot_complete_without_analyzing() {
        let mut s = site("North Sub", 39.8, -89.6);
        assert!(s.complete(estimate(10.0), SiteDetails::default()).is_err());
        assert!(s.capacity_estimate.is_none());
    }

    #[test]
    fn test_natural_key_identity() {
        let a = site("North Sub", 39.8, -89.6);
        let mut b = site("North Sub", 39.8, -89.6);
        b.id = "other-id".to_string();
        let c = site("North Sub", 39.8001, -89.6);

        assert_eq!(a.natural_key(), b.natural_key());
        assert_ne!(a.natural_key(), c.natural_key());

        let zero = site("Origin", 0.0, 0.0);
        let neg_zero = site("Origin", -0.0, -0.0);
        assert_eq!(zero.natural_key(), neg_zero.natural_key());
    }

    #[test]
    fn test_ad_hoc_site() {
        let s = SiteRecord::ad_hoc("Old Mill".to_string(), String::new(), None);
        assert_eq!(s.coordinates_source, CoordinatesSource::Manual);
        assert!(Uuid::parse_str(&s.id).is_ok());
        assert!(s.natural_key().is_none());
        assert!(s.map_link().is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Completed".parse::<AnalysisStatus>().unwrap(), AnalysisStatus::Completed);
        assert!("done".parse::<AnalysisStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&AnalysisStatus::Analyzing).unwrap(),
            "\"analyzing\""
        );
    }
}
