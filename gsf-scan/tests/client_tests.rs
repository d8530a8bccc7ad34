// Integration tests for the HTTP service clients using wiremock.

use gsf_common::Coordinates;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gsf_scan::error::{DiscoveryError, EnrichmentError};
use gsf_scan::models::{LocationQuery, UtilityContext};
use gsf_scan::services::{
    CapacityEstimator, CapacityRequest, DiscoveryLimits, HttpCapacityClient, HttpDiscoveryClient,
    HttpOwnershipClient, OwnershipDetector, OwnershipRequest, SiteDiscovery,
};

const TIMEOUT: Duration = Duration::from_secs(2);
// High enough that the limiter never delays a test
const RPS: u32 = 100;

fn limits() -> DiscoveryLimits {
    DiscoveryLimits {
        default_radius_meters: 25_000.0,
        max_results: 50,
    }
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_normalizes_candidates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/discover"))
        .and(body_partial_json(json!({
            "location": "Rochester, MN",
            "searchRadiusMeters": 25000.0,
            "maxResults": 50
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "substations": [
                { "id": 17, "name": "North Sub", "latitude": 44.05, "longitude": -92.48,
                  "address": "1 Grid Rd, Rochester, MN 55901, USA" },
                { "place_id": "pl-2", "name": "  South Sub ", "latitude": 43.98, "longitude": -92.46 },
                { "id": "dup", "name": "North Sub", "latitude": 44.05, "longitude": -92.48 },
                { "id": "no-coords", "name": "Ghost" },
                { "id": "bad", "name": "Pole", "latitude": 123.0, "longitude": 0.0 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpDiscoveryClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let sites = client
        .discover(&LocationQuery::place("Rochester, MN"), &limits())
        .await
        .unwrap();

    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0].id, "17");
    assert_eq!(sites[0].name, "North Sub");
    assert_eq!(sites[1].id, "pl-2");
    assert_eq!(sites[1].name, "South Sub");
    assert!(sites
        .iter()
        .all(|s| s.analysis_status == gsf_common::AnalysisStatus::Pending));
}

#[tokio::test]
async fn test_discover_region_uses_its_radius() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/discover"))
        .and(body_partial_json(json!({ "searchRadiusMeters": 5000.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "substations": [
                { "id": "a", "name": "Only Sub", "latitude": 44.0, "longitude": -92.5 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpDiscoveryClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let query = LocationQuery::region(Coordinates::new(44.0, -92.5).unwrap(), 5_000.0);
    let sites = client.discover(&query, &limits()).await.unwrap();
    assert_eq!(sites.len(), 1);
}

#[tokio::test]
async fn test_discover_empty_result_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "substations": [] })))
        .mount(&server)
        .await;

    let client = HttpDiscoveryClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let result = client
        .discover(&LocationQuery::place("Nowhere"), &limits())
        .await;

    assert!(
        matches!(result, Err(DiscoveryError::NoCandidates(_))),
        "expected NoCandidates, got: {result:?}"
    );
}

#[tokio::test]
async fn test_discover_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = HttpDiscoveryClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let result = client
        .discover(&LocationQuery::place("Rochester, MN"), &limits())
        .await;

    match result {
        Err(DiscoveryError::Remote { status, message }) => {
            assert_eq!(status, 503);
            assert!(message.contains("maintenance"));
        }
        other => panic!("expected Remote error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_discover_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/discover"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "substations": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = HttpDiscoveryClient::new(server.uri(), Duration::from_millis(200), RPS).unwrap();
    let result = client
        .discover(&LocationQuery::place("Rochester, MN"), &limits())
        .await;

    assert!(
        matches!(result, Err(DiscoveryError::Timeout(_))),
        "expected Timeout, got: {result:?}"
    );
}

// ── Capacity ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_capacity_estimate_with_percent_confidence() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/estimate-capacity"))
        .and(body_partial_json(json!({
            "latitude": 44.0,
            "longitude": -92.5,
            "manualOverride": { "utilityContext": { "name": "Rochester Public Utilities" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "estimatedCapacity": { "min": 40.0, "max": 120.0 },
            "detectionResults": { "confidence": 82 },
            "voltageLevel": "161kV",
            "substationType": "distribution"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCapacityClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let context = UtilityContext {
        name: "Rochester Public Utilities".to_string(),
        notes: String::new(),
    };
    let request = CapacityRequest::new(&Coordinates::new(44.0, -92.5).unwrap(), Some(&context));
    let assessment = client.estimate(&request).await.unwrap();

    assert_eq!(assessment.estimate.min, 40.0);
    assert_eq!(assessment.estimate.max, 120.0);
    assert!((assessment.estimate.confidence - 0.82).abs() < 1e-9);
    assert_eq!(assessment.voltage_level.as_deref(), Some("161kV"));
    assert_eq!(assessment.interconnection_type, None);
}

#[tokio::test]
async fn test_capacity_inverted_range_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/estimate-capacity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "estimatedCapacity": { "min": 90.0, "max": 10.0 }
        })))
        .mount(&server)
        .await;

    let client = HttpCapacityClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let request = CapacityRequest::new(&Coordinates::new(44.0, -92.5).unwrap(), None);
    let result = client.estimate(&request).await;

    assert!(
        matches!(result, Err(EnrichmentError::Malformed(_))),
        "expected Malformed, got: {result:?}"
    );
}

#[tokio::test]
async fn test_capacity_missing_fields_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/estimate-capacity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let client = HttpCapacityClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let request = CapacityRequest::new(&Coordinates::new(44.0, -92.5).unwrap(), None);
    let result = client.estimate(&request).await;

    assert!(
        matches!(result, Err(EnrichmentError::Malformed(_))),
        "expected Malformed, got: {result:?}"
    );
}

#[tokio::test]
async fn test_capacity_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/estimate-capacity"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let client = HttpCapacityClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let request = CapacityRequest::new(&Coordinates::new(44.0, -92.5).unwrap(), None);
    let result = client.estimate(&request).await;

    assert!(
        matches!(result, Err(EnrichmentError::Remote { status: 500, .. })),
        "expected Remote 500, got: {result:?}"
    );
}

// ── Ownership ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_ownership_detected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/detect-ownership"))
        .and(body_partial_json(json!({ "name": "North Sub" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "owner": " Xcel Energy ",
            "confidence": 0.9,
            "source": "eia-861"
        })))
        .mount(&server)
        .await;

    let client = HttpOwnershipClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let request = OwnershipRequest::new(
        "North Sub",
        "Rochester, MN",
        &Coordinates::new(44.05, -92.48).unwrap(),
    );
    let result = client.detect(&request).await.unwrap();

    assert_eq!(result.owner, "Xcel Energy");
    assert_eq!(result.confidence, 0.9);
    assert_eq!(result.source, "eia-861");
}

#[tokio::test]
async fn test_ownership_blank_owner_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/detect-ownership"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "owner": "   " })))
        .mount(&server)
        .await;

    let client = HttpOwnershipClient::new(server.uri(), TIMEOUT, RPS).unwrap();
    let request = OwnershipRequest::new("North Sub", "", &Coordinates::new(44.05, -92.48).unwrap());
    let result = client.detect(&request).await;

    assert!(
        matches!(result, Err(EnrichmentError::Malformed(_))),
        "expected Malformed, got: {result:?}"
    );
}
