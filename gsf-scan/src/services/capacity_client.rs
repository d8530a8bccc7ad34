//! Capacity analysis client
//!
//! `POST {base}/estimate-capacity` with the site coordinates (and optional utility
//! context) returns an estimated capacity range plus detection confidence.

use async_trait::async_trait;
use gsf_common::{CapacityEstimate, Coordinates};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http_support::{self, DirectRateLimiter};
use crate::error::EnrichmentError;
use crate::models::UtilityContext;

pub const CAPACITY_SOURCE_ID: &str = "capacity-analysis";

/// Capacity estimation request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<ManualOverride>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualOverride {
    pub utility_context: UtilityContext,
}

impl CapacityRequest {
    pub fn new(coordinates: &Coordinates, context: Option<&UtilityContext>) -> Self {
        Self {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            manual_override: context.map(|c| ManualOverride {
                utility_context: c.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityResponse {
    pub estimated_capacity: CapacityRange,
    #[serde(default)]
    pub detection_results: Option<DetectionResults>,
    #[serde(default)]
    pub voltage_level: Option<String>,
    #[serde(default)]
    pub substation_type: Option<String>,
    #[serde(default)]
    pub interconnection_type: Option<String>,
    #[serde(default)]
    pub load_factor: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapacityRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionResults {
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Validated capacity result
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityAssessment {
    pub estimate: CapacityEstimate,
    pub voltage_level: Option<String>,
    pub substation_type: Option<String>,
    pub interconnection_type: Option<String>,
    pub load_factor: Option<f64>,
}

/// Capacity estimation capability
#[async_trait]
pub trait CapacityEstimator: Send + Sync {
    /// Identifier recorded as the estimate's source
    fn source_id(&self) -> &str {
        CAPACITY_SOURCE_ID
    }

    async fn estimate(&self, request: &CapacityRequest) -> Result<CapacityAssessment, EnrichmentError>;
}

/// Confidence on a 0-1 scale; percentages (values above 1) are divided down
pub fn normalize_confidence(raw: f64) -> Result<f64, EnrichmentError> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(EnrichmentError::Malformed(format!(
            "confidence out of range: {}",
            raw
        )));
    }
    let value = if raw > 1.0 { raw / 100.0 } else { raw };
    if value > 1.0 {
        return Err(EnrichmentError::Malformed(format!(
            "confidence out of range: {}",
            raw
        )));
    }
    Ok(value)
}

impl TryFrom<CapacityResponse> for CapacityAssessment {
    type Error = EnrichmentError;

    fn try_from(response: CapacityResponse) -> Result<Self, Self::Error> {
        let CapacityRange { min, max } = response.estimated_capacity;
        if !min.is_finite() || !max.is_finite() || min < 0.0 || max < 0.0 {
            return Err(EnrichmentError::Malformed(format!(
                "capacity range not usable: {}..{}",
                min, max
            )));
        }
        if min > max {
            return Err(EnrichmentError::Malformed(format!(
                "capacity min {} exceeds max {}",
                min, max
            )));
        }

        let confidence = response
            .detection_results
            .and_then(|d| d.confidence)
            .map(normalize_confidence)
            .transpose()?
            .unwrap_or(0.0);

        Ok(CapacityAssessment {
            estimate: CapacityEstimate {
                min,
                max,
                confidence,
            },
            voltage_level: response.voltage_level,
            substation_type: response.substation_type,
            interconnection_type: response.interconnection_type,
            load_factor: response.load_factor.filter(|f| f.is_finite()),
        })
    }
}

/// HTTP capacity analysis client
pub struct HttpCapacityClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: DirectRateLimiter,
}

impl HttpCapacityClient {
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

pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> EnrichmentError {
    if err.is_timeout() {
        EnrichmentError::Timeout(timeout)
    } else if err.is_decode() {
        EnrichmentError::Malformed(err.to_string())
    } else {
        EnrichmentError::Network(err.to_string())
    }
}

#[async_trait]
impl CapacityEstimator for HttpCapacityClient {
    async fn estimate(&self, request: &CapacityRequest) -> Result<CapacityAssessment, EnrichmentError> {
        self.rate_limiter.until_ready().await;

        let url = http_support::join_url(&self.base_url, "estimate-capacity");
        tracing::debug!(
            url = %url,
            latitude = request.latitude,
            longitude = request.longitude,
            "Requesting capacity estimate"
        );

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

        let body: CapacityResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        CapacityAssessment::try_from(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<CapacityAssessment, EnrichmentError> {
        let response: CapacityResponse = serde_json::from_value(value).unwrap();
        CapacityAssessment::try_from(response)
    }

    #[test]
    fn test_valid_response() {
        let a = parse(json!({
            "estimatedCapacity": {"min": 40.0, "max": 120.0},
            "detectionResults": {"confidence": 0.85},
            "voltageLevel": "138kV"
        }))
        .unwrap();
        assert_eq!(a.estimate.min, 40.0);
        assert_eq!(a.estimate.max, 120.0);
        assert_eq!(a.estimate.confidence, 0.85);
        assert_eq!(a.voltage_level.as_deref(), Some("138kV"));
    }

    #[test]
    fn test_percent_confidence_normalized() {
        let a = parse(json!({
            "estimatedCapacity": {"min": 1.0, "max": 2.0},
            "detectionResults": {"confidence": 72}
        }))
        .unwrap();
        assert!((a.estimate.confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_missing_confidence_is_zero() {
        let a = parse(json!({"estimatedCapacity": {"min": 1.0, "max": 2.0}})).unwrap();
        assert_eq!(a.estimate.confidence, 0.0);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = parse(json!({"estimatedCapacity": {"min": 10.0, "max": 2.0}})).unwrap_err();
        assert!(matches!(err, EnrichmentError::Malformed(_)));
    }

    #[test]
    fn test_negative_capacity_rejected() {
        assert!(parse(json!({"estimatedCapacity": {"min": -1.0, "max": 2.0}})).is_err());
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(normalize_confidence(-0.1).is_err());
        assert!(normalize_confidence(150.0).is_err());
        assert!(normalize_confidence(f64::NAN).is_err());
        assert_eq!(normalize_confidence(1.0).unwrap(), 1.0);
        assert_eq!(normalize_confidence(100.0).unwrap(), 1.0);
    }

    #[test]
    fn test_request_with_context() {
        let coords = Coordinates::new(30.0, -97.0).unwrap();
        let context = UtilityContext {
            name: "Austin Energy".to_string(),
            notes: "idle plant".to_string(),
        };
        let value = serde_json::to_value(CapacityRequest::new(&coords, Some(&context))).unwrap();
        assert_eq!(value["latitude"], 30.0);
        assert_eq!(value["manualOverride"]["utilityContext"]["name"], "Austin Energy");

        let bare = serde_json::to_value(CapacityRequest::new(&coords, None)).unwrap();
        assert!(bare.get("manualOverride").is_none());
    }
}
