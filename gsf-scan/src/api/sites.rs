//! Site API handlers
//!
//! GET /sites, GET /sites/clusters, GET /sites/export.csv, POST /sites/analyze
//!
//! The listing, cluster and export endpoints share one set of query parameters:
//! `search`, `status`, `capacity`, `location`, `confidence`, `near_lat`,
//! `near_lng`, `radius_km`, `scope=current|stored` and `source=discovery|manual`.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use gsf_common::{Coordinates, CoordinatesSource, SiteRecord};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::UtilityContext;
use crate::services::{cluster_sites, export_csv, filter_sites, Cluster, FilterSpec, Proximity};
use crate::AppState;

/// Which collection to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteScope {
    /// Sites of the most recent scan
    #[default]
    Current,
    /// Everything in the site store
    Stored,
}

#[derive(Debug, Default, Deserialize)]
pub struct SiteQueryParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub capacity: Option<String>,
    pub location: Option<String>,
    pub confidence: Option<String>,
    pub near_lat: Option<f64>,
    pub near_lng: Option<f64>,
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub scope: SiteScope,
    pub source: Option<String>,
}

impl SiteQueryParams {
    fn reference_point(&self) -> ApiResult<Option<Coordinates>> {
        match (self.near_lat, self.near_lng) {
            (Some(lat), Some(lng)) => Ok(Some(Coordinates::new(lat, lng)?)),
            (None, None) => Ok(None),
            _ => Err(ApiError::BadRequest(
                "near_lat and near_lng must be given together".to_string(),
            )),
        }
    }

    fn source(&self) -> ApiResult<Option<CoordinatesSource>> {
        match self.source.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(s) => Ok(Some(s.parse()?)),
        }
    }

    /// Build the filter predicate; unknown labels are a 400
    pub fn filter_spec(&self) -> ApiResult<FilterSpec> {
        let mut spec = FilterSpec {
            search_term: self.search.clone(),
            location_substring: self.location.clone(),
            ..Default::default()
        };
        if let Some(status) = &self.status {
            spec.status = status.parse()?;
        }
        if let Some(capacity) = &self.capacity {
            spec.capacity_bucket = capacity.parse()?;
        }
        if let Some(confidence) = &self.confidence {
            spec.confidence_bucket = confidence.parse()?;
        }
        if let Some(radius_km) = self.radius_km {
            let center = self.reference_point()?.ok_or_else(|| {
                ApiError::BadRequest("radius_km requires near_lat and near_lng".to_string())
            })?;
            if !radius_km.is_finite() || radius_km <= 0.0 {
                return Err(ApiError::BadRequest(format!(
                    "radius_km must be positive, got {}",
                    radius_km
                )));
            }
            spec.proximity = Some(Proximity { center, radius_km });
        }
        Ok(spec)
    }
}

/// Read the requested collection and apply the filter
async fn select_sites(state: &AppState, params: &SiteQueryParams) -> ApiResult<Vec<SiteRecord>> {
    let spec = params.filter_spec()?;
    let source = params.source()?;

    let sites = match params.scope {
        SiteScope::Current => state
            .pipeline
            .current_sites()
            .into_iter()
            .filter(|s| source.map_or(true, |src| s.coordinates_source == src))
            .collect(),
        SiteScope::Stored => {
            let store = state
                .pipeline
                .store()
                .ok_or_else(|| ApiError::Internal("No site store configured".to_string()))?;
            store.load_sites(source).await?
        }
    };

    Ok(filter_sites(&sites, &spec))
}

#[derive(Debug, Serialize)]
pub struct SitesResponse {
    pub scope: SiteScope,
    pub count: usize,
    pub sites: Vec<SiteRecord>,
}

/// GET /sites
pub async fn list_sites(
    State(state): State<AppState>,
    Query(params): Query<SiteQueryParams>,
) -> ApiResult<Json<SitesResponse>> {
    let sites = select_sites(&state, &params).await?;
    Ok(Json(SitesResponse {
        scope: params.scope,
        count: sites.len(),
        sites,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClusterParams {
    pub radius: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ClustersResponse {
    pub radius_degrees: f64,
    pub count: usize,
    pub clusters: Vec<Cluster>,
}

/// GET /sites/clusters?radius=
pub async fn list_clusters(
    State(state): State<AppState>,
    Query(params): Query<ClusterParams>,
    Query(filters): Query<SiteQueryParams>,
) -> ApiResult<Json<ClustersResponse>> {
    let radius = params
        .radius
        .unwrap_or(state.pipeline.settings().cluster_radius_degrees);
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ApiError::BadRequest(format!(
            "radius must be positive, got {}",
            radius
        )));
    }

    let sites = select_sites(&state, &filters).await?;
    let clusters = cluster_sites(&sites, radius);
    Ok(Json(ClustersResponse {
        radius_degrees: radius,
        count: clusters.len(),
        clusters,
    }))
}

/// GET /sites/export.csv
///
/// `near_lat`/`near_lng` also fill the distance column.
pub async fn export_sites(
    State(state): State<AppState>,
    Query(params): Query<SiteQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let sites = select_sites(&state, &params).await?;
    let reference = params.reference_point()?;
    let body = export_csv(&sites, reference.as_ref());

    tracing::info!(rows = sites.len(), "Exported sites as CSV");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"sites.csv\"",
            ),
        ],
        body,
    ))
}

/// POST /sites/analyze request
#[derive(Debug, Deserialize)]
pub struct AnalyzeSiteRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub context: Option<UtilityContext>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeSiteResponse {
    pub site: SiteRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
}

/// POST /sites/analyze
///
/// Runs a single enrichment for an operator-entered site and stores it on success.
pub async fn analyze_site(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeSiteRequest>,
) -> ApiResult<Json<AnalyzeSiteResponse>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Site name must not be empty".to_string()));
    }

    let coordinates = match (request.latitude, request.longitude) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)?),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "latitude and longitude must be given together".to_string(),
            ))
        }
    };

    let site = SiteRecord::ad_hoc(name.to_string(), request.address.trim().to_string(), coordinates);
    tracing::info!(site = %site.name, id = %site.id, "Analyzing ad-hoc site");

    let (site, storage_warning) = state
        .pipeline
        .analyze_site(site, request.context.as_ref())
        .await;

    Ok(Json(AnalyzeSiteResponse {
        site,
        storage_warning,
    }))
}

pub fn site_routes() -> Router<AppState> {
    Router::new()
        .route("/sites", get(list_sites))
        .route("/sites/clusters", get(list_clusters))
        .route("/sites/export.csv", get(export_sites))
        .route("/sites/analyze", post(analyze_site))
}
