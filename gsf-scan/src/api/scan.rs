//! Scan API handlers
//!
//! POST /scan/start, GET /scan/status/:session_id, POST /scan/cancel/:session_id,
//! GET /scan/history

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ScanPhase, ScanRequest, ScanSession};
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 200;

/// POST /scan/start response
#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub session_id: Uuid,
    pub phase: ScanPhase,
    pub started_at: DateTime<Utc>,
}

/// GET /scan/status response
#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    #[serde(flatten)]
    pub session: ScanSession,
    pub elapsed_seconds: u64,
    /// True while this session is the running scan
    pub active: bool,
}

/// POST /scan/cancel response
#[derive(Debug, Serialize)]
pub struct CancelScanResponse {
    pub session_id: Uuid,
    pub cancel_requested: bool,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// POST /scan/start
///
/// Admits the scan and runs it in the background. 409 while another scan runs.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<StartScanResponse>> {
    let (handle, session) = state.pipeline.start_scan(request)?;

    let pipeline = state.pipeline.clone();
    let last_error = state.last_error.clone();
    let session_id = session.session_id;
    tokio::spawn(async move {
        let finished = pipeline.execute(handle).await;
        tracing::info!(
            session_id = %session_id,
            phase = finished.phase.label(),
            "Background scan task finished"
        );
        if let Some(error) = finished.error {
            *last_error.write().await = Some(error);
        }
    });

    Ok(Json(StartScanResponse {
        session_id: session.session_id,
        phase: session.phase,
        started_at: session.started_at,
    }))
}

/// GET /scan/status/:session_id
///
/// Live snapshot for sessions run by this process, archived row otherwise.
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ScanStatusResponse>> {
    let session = match state.pipeline.session(session_id) {
        Some(session) => session,
        None => crate::db::sessions::load_session(&state.db, session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Scan session not found: {}", session_id)))?,
    };

    let active = state.pipeline.active_session_id() == Some(session_id);
    Ok(Json(ScanStatusResponse {
        elapsed_seconds: session.elapsed_seconds(),
        active,
        session,
    }))
}

/// POST /scan/cancel/:session_id
///
/// Cancellation takes effect between sites.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CancelScanResponse>> {
    if let Err(err) = state.pipeline.cancel_scan(session_id) {
        // Sessions from earlier runs are only known to the database
        if let crate::error::ScanError::UnknownSession(_) = err {
            if let Some(archived) = crate::db::sessions::load_session(&state.db, session_id).await? {
                return Err(ApiError::BadRequest(format!(
                    "Scan session {} is not running (phase: {})",
                    session_id,
                    archived.phase.label()
                )));
            }
        }
        return Err(err.into());
    }

    Ok(Json(CancelScanResponse {
        session_id,
        cancel_requested: true,
        requested_at: Utc::now(),
    }))
}

/// GET /scan/history
pub async fn get_scan_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<ScanSession>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = crate::db::sessions::list_history(&state.db, limit).await?;
    Ok(Json(history))
}

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan/start", post(start_scan))
        .route("/scan/status/:session_id", get(get_scan_status))
        .route("/scan/cancel/:session_id", post(cancel_scan))
        .route("/scan/history", get(get_scan_history))
}
