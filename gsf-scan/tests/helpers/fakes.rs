//! In-process stand-ins for the remote capabilities and the site store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gsf_common::{Coordinates, CoordinatesSource, SiteRecord};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use gsf_scan::error::{DiscoveryError, EnrichmentError, PersistenceError};
use gsf_scan::models::{LocationQuery, ScanSession};
use gsf_scan::services::{
    CapacityAssessment, CapacityEstimator, CapacityRequest, DiscoveryLimits, OwnershipDetector,
    OwnershipRequest, OwnershipResult, ScanStore, SiteDiscovery,
};

/// Pending discovery record at the given point
pub fn site(id: &str, name: &str, latitude: f64, longitude: f64) -> SiteRecord {
    SiteRecord::discovered(
        id.to_string(),
        name.to_string(),
        format!("{} Rd, Austin, TX 78701, USA", name),
        Coordinates::new(latitude, longitude).unwrap(),
    )
}

/// Three pending sites around Austin
pub fn three_sites() -> Vec<SiteRecord> {
    vec![
        site("s1", "North Substation", 30.40, -97.70),
        site("s2", "East Substation", 30.27, -97.60),
        site("s3", "South Substation", 30.15, -97.75),
    ]
}

/// Discovery that returns a fixed set (or a fixed error) after an optional delay
pub struct FakeDiscovery {
    pub sites: Vec<SiteRecord>,
    pub error: Option<String>,
    pub delay: Duration,
}

impl FakeDiscovery {
    pub fn returning(sites: Vec<SiteRecord>) -> Self {
        Self {
            sites,
            error: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            sites: Vec::new(),
            error: Some(message.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SiteDiscovery for FakeDiscovery {
    async fn discover(
        &self,
        _query: &LocationQuery,
        limits: &DiscoveryLimits,
    ) -> Result<Vec<SiteRecord>, DiscoveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.error {
            return Err(DiscoveryError::Unreachable(message.clone()));
        }
        Ok(self.sites.iter().take(limits.max_results).cloned().collect())
    }
}

/// Capacity estimator that fails for the listed coordinates' latitudes
///
/// Every other site gets `min = latitude`, `max = latitude * 2`, confidence 0.85.
pub struct FakeCapacity {
    pub failing_latitudes: Vec<f64>,
    pub delay: Duration,
    pub calls: Mutex<Vec<(f64, f64)>>,
}

impl FakeCapacity {
    pub fn new() -> Self {
        Self {
            failing_latitudes: Vec::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(latitudes: &[f64]) -> Self {
        Self {
            failing_latitudes: latitudes.to_vec(),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CapacityEstimator for FakeCapacity {
    async fn estimate(&self, request: &CapacityRequest) -> Result<CapacityAssessment, EnrichmentError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.latitude, request.longitude));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .failing_latitudes
            .iter()
            .any(|lat| (lat - request.latitude).abs() < 1e-9)
        {
            return Err(EnrichmentError::Remote {
                status: 500,
                message: "model unavailable".to_string(),
            });
        }
        Ok(CapacityAssessment {
            estimate: gsf_common::CapacityEstimate {
                min: request.latitude,
                max: request.latitude * 2.0,
                confidence: 0.85,
            },
            voltage_level: Some("138kV".to_string()),
            substation_type: Some("transmission".to_string()),
            interconnection_type: None,
            load_factor: Some(0.6),
        })
    }
}

/// Ownership detector that always answers with one owner
pub struct FakeOwnership {
    pub owner: String,
}

#[async_trait]
impl OwnershipDetector for FakeOwnership {
    async fn detect(&self, _request: &OwnershipRequest) -> Result<OwnershipResult, EnrichmentError> {
        Ok(OwnershipResult {
            owner: self.owner.clone(),
            confidence: 0.7,
            source: "registry".to_string(),
        })
    }
}

/// Site store that rejects writes for chosen site names and records the rest
#[derive(Default)]
pub struct FlakyStore {
    pub rejected_names: HashSet<String>,
    pub stored: Mutex<Vec<SiteRecord>>,
    pub sessions: Mutex<Vec<ScanSession>>,
}

impl FlakyStore {
    pub fn rejecting(names: &[&str]) -> Self {
        Self {
            rejected_names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn stored_names(&self) -> Vec<String> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }
}

#[async_trait]
impl ScanStore for FlakyStore {
    async fn upsert_site(&self, site: &SiteRecord) -> Result<DateTime<Utc>, PersistenceError> {
        if self.rejected_names.contains(&site.name) {
            return Err(PersistenceError::Unavailable("disk full".to_string()));
        }
        self.stored.lock().unwrap().push(site.clone());
        Ok(Utc::now())
    }

    async fn load_sites(
        &self,
        source: Option<CoordinatesSource>,
    ) -> Result<Vec<SiteRecord>, PersistenceError> {
        Ok(self
            .stored
            .lock()
            .unwrap()
            .iter()
            .filter(|s| source.map_or(true, |src| s.coordinates_source == src))
            .cloned()
            .collect())
    }

    async fn save_session(&self, session: &ScanSession) -> Result<(), PersistenceError> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(())
    }
}
