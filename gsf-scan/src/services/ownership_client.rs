//! Ownership detection client
//!
//! Optional enrichment: `POST {base}/detect-ownership` names the likely operator
//! of a site. Failures here never fail the site.

use async_trait::async_trait;
use gsf_common::Coordinates;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::capacity_client::{map_reqwest_error, normalize_confidence};
use super::http_support::{self, DirectRateLimiter};
use crate::error::EnrichmentError;

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

impl OwnershipRequest {
    pub fn new(name: &str, address: &str, coordinates: &Coordinates) -> Self {
        Self {
            name: name.to_string(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            address: address.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnershipResult {
    pub owner: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub source: String,
}

#[async_trait]
pub trait OwnershipDetector: Send + Sync {
    async fn detect(&self, request: &OwnershipRequest) -> Result<OwnershipResult, EnrichmentError>;
}

pub struct HttpOwnershipClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: DirectRateLimiter,
}

impl HttpOwnershipClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, EnrichmentError> {
        let http_client = http_support::build_http_client(timeout)
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            timeout,
            rate_limiter: http_support::rate_limiter(requests_per_second),
        })
    }
}

#[async_trait]
impl OwnershipDetector for HttpOwnershipClient {
    async fn detect(&self, request: &OwnershipRequest) -> Result<OwnershipResult, EnrichmentError> {
        self.rate_limiter.until_ready().await;

        let url = http_support::join_url(&self.base_url, "detect-ownership");
        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = http_support::error_body(response).await;
            return Err(EnrichmentError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let mut result: OwnershipResult = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        result.owner = result.owner.trim().to_string();
        if result.owner.is_empty() {
            return Err(EnrichmentError::Malformed("empty owner".to_string()));
        }
        result.confidence = normalize_confidence(result.confidence)?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fields() {
        let coords = Coordinates::new(44.0, -92.5).unwrap();
        let request = OwnershipRequest::new("North Sub", "Rochester, MN", &coords);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["name"], "North Sub");
        assert_eq!(value["latitude"], 44.0);
        assert_eq!(value["address"], "Rochester, MN");
    }

    #[test]
    fn test_result_defaults() {
        let result: OwnershipResult = serde_json::from_str(r#"{"owner":"Xcel"}"#).unwrap();
        assert_eq!(result.owner, "Xcel");
        assert_eq!(result.confidence, 0.0);
        assert!(result.source.is_empty());
    }
}
