//! Discovery service client
//!
//! One outbound call per scan: `POST {base}/discover` with
//! `{ location, searchRadiusMeters, maxResults }`, answered by
//! `{ substations: [{ id, name, latitude, longitude, place_id, address }] }`.
//!
//! Candidates are normalized into pending [`SiteRecord`]s. Entries without a name or
//! with unusable coordinates are dropped, and duplicates (same name and coordinates)
//! collapse to the first occurrence. An empty result is a [`DiscoveryError`].

use async_trait::async_trait;
use gsf_common::site::SiteKey;
use gsf_common::{Coordinates, SiteRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use super::http_support::{self, DirectRateLimiter};
use crate::error::DiscoveryError;
use crate::models::LocationQuery;

/// Search limits applied to one discovery call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscoveryLimits {
    /// Used for place queries; region queries carry their own radius
    pub default_radius_meters: f64,
    pub max_results: usize,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            default_radius_meters: 25_000.0,
            max_results: 50,
        }
    }
}

/// Finds candidate sites for a location query
#[async_trait]
pub trait SiteDiscovery: Send + Sync {
    async fn discover(
        &self,
        query: &LocationQuery,
        limits: &DiscoveryLimits,
    ) -> Result<Vec<SiteRecord>, DiscoveryError>;
}

/// Discovery request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub location: String,
    pub search_radius_meters: f64,
    pub max_results: usize,
}

/// Discovery response body
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub substations: Vec<DiscoveredCandidate>,
}

/// Raw candidate as returned by the service; every field may be missing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveredCandidate {
    /// String or number, depending on the upstream provider
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

fn candidate_id(candidate: &DiscoveredCandidate) -> String {
    let remote = match &candidate.id {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    remote
        .or_else(|| {
            candidate
                .place_id
                .as_ref()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Turn raw candidates into deduplicated pending site records, preserving order
pub fn normalize_candidates(candidates: Vec<DiscoveredCandidate>) -> Vec<SiteRecord> {
    let total = candidates.len();
    let mut seen: HashSet<SiteKey> = HashSet::with_capacity(total);
    let mut sites = Vec::with_capacity(total);
    let mut unusable = 0usize;
    let mut duplicates = 0usize;

    for candidate in candidates {
        let name = candidate
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            unusable += 1;
            continue;
        }

        let coordinates = match (candidate.latitude, candidate.longitude) {
            (Some(lat), Some(lng)) => match Coordinates::new(lat, lng) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(site = %name, error = %e, "Dropping candidate");
                    unusable += 1;
                    continue;
                }
            },
            _ => {
                tracing::debug!(site = %name, "Dropping candidate without coordinates");
                unusable += 1;
                continue;
            }
        };

        if !seen.insert(SiteKey::new(&name, &coordinates)) {
            duplicates += 1;
            continue;
        }

        let address = candidate
            .address
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        sites.push(SiteRecord::discovered(
            candidate_id(&candidate),
            name,
            address,
            coordinates,
        ));
    }

    if unusable > 0 || duplicates > 0 {
        tracing::info!(
            total,
            kept = sites.len(),
            unusable,
            duplicates,
            "Normalized discovery candidates"
        );
    }

    sites
}

/// HTTP discovery client
pub struct HttpDiscoveryClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: DirectRateLimiter,
}

impl HttpDiscoveryClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, DiscoveryError> {
        let http_client = http_support::build_http_client(timeout)
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            timeout,
            rate_limiter: http_support::rate_limiter(requests_per_second),
        })
    }

    async fn call(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse, DiscoveryError> {
        let url = http_support::join_url(&self.base_url, "discover");
        tracing::debug!(url = %url, location = %request.location, "Querying discovery service");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DiscoveryError::Timeout(self.timeout)
                } else {
                    DiscoveryError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = http_support::error_body(response).await;
            return Err(DiscoveryError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<DiscoveryResponse>().await.map_err(|e| {
            if e.is_timeout() {
                DiscoveryError::Timeout(self.timeout)
            } else {
                DiscoveryError::Malformed(e.to_string())
            }
        })
    }
}

#[async_trait]
impl SiteDiscovery for HttpDiscoveryClient {
    async fn discover(
        &self,
        query: &LocationQuery,
        limits: &DiscoveryLimits,
    ) -> Result<Vec<SiteRecord>, DiscoveryError> {
        self.rate_limiter.until_ready().await;

        let request = DiscoveryRequest {
            location: query.location_string(),
            search_radius_meters: query.radius_meters(limits.default_radius_meters),
            max_results: limits.max_results,
        };

        // Outer bound covers slow bodies as well as slow connects
        let response = tokio::time::timeout(self.timeout, self.call(&request))
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout))??;

        let returned = response.substations.len();
        let sites = normalize_candidates(response.substations);

        tracing::info!(
            query = %query.describe(),
            returned,
            usable = sites.len(),
            "Discovery call finished"
        );

        if sites.is_empty() {
            return Err(DiscoveryError::NoCandidates(query.describe()));
        }

        Ok(sites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsf_common::AnalysisStatus;
    use serde_json::json;

    fn candidate(id: serde_json::Value, name: &str, lat: f64, lng: f64) -> DiscoveredCandidate {
        DiscoveredCandidate {
            id: Some(id),
            name: Some(name.to_string()),
            latitude: Some(lat),
            longitude: Some(lng),
            place_id: None,
            address: Some(" 1 Grid Rd, Austin, TX 78701, USA ".to_string()),
        }
    }

    #[test]
    fn test_normalized_records_are_pending() {
        let sites = normalize_candidates(vec![candidate(json!("a"), " East Sub ", 30.2, -97.7)]);
        assert_eq!(sites.len(), 1);
        let site = &sites[0];
        assert_eq!(site.id, "a");
        assert_eq!(site.name, "East Sub");
        assert_eq!(site.address, "1 Grid Rd, Austin, TX 78701, USA");
        assert_eq!(site.analysis_status, AnalysisStatus::Pending);
        assert!(site.capacity_estimate.is_none());
        assert!(site.details.is_none());
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let sites = normalize_candidates(vec![
            candidate(json!("a"), "East Sub", 30.2, -97.7),
            candidate(json!("b"), "West Sub", 30.3, -97.8),
            candidate(json!("c"), "East Sub", 30.2, -97.7),
        ]);
        let ids: Vec<_> = sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_same_name_different_coordinates_kept() {
        let sites = normalize_candidates(vec![
            candidate(json!("a"), "East Sub", 30.2, -97.7),
            candidate(json!("b"), "East Sub", 30.21, -97.7),
        ]);
        assert_eq!(sites.len(), 2);
    }

    #[test]
    fn test_unusable_candidates_dropped() {
        let mut no_coords = candidate(json!("x"), "No Coords", 0.0, 0.0);
        no_coords.latitude = None;
        let sites = normalize_candidates(vec![
            candidate(json!("a"), "   ", 30.2, -97.7),
            candidate(json!("b"), "Bad Lat", 130.0, -97.7),
            no_coords,
            candidate(json!("c"), "Good", 30.2, -97.7),
        ]);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "Good");
    }

    #[test]
    fn test_id_fallbacks() {
        let numeric = normalize_candidates(vec![candidate(json!(42), "N", 1.0, 1.0)]);
        assert_eq!(numeric[0].id, "42");

        let mut with_place = candidate(json!(""), "P", 1.0, 1.0);
        with_place.place_id = Some("ChIJ123".to_string());
        let place = normalize_candidates(vec![with_place]);
        assert_eq!(place[0].id, "ChIJ123");

        let mut bare = candidate(json!(null), "U", 1.0, 1.0);
        bare.id = None;
        let generated = normalize_candidates(vec![bare]);
        assert!(Uuid::parse_str(&generated[0].id).is_ok());
    }

    #[test]
    fn test_request_wire_format() {
        let request = DiscoveryRequest {
            location: "Austin, TX".to_string(),
            search_radius_meters: 25000.0,
            max_results: 50,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["location"], "Austin, TX");
        assert_eq!(value["searchRadiusMeters"], 25000.0);
        assert_eq!(value["maxResults"], 50);
    }
}
