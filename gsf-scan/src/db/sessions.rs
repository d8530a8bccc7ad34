//! Scan session history
//!
//! Every scan is archived to `scan_sessions` as it progresses so `/scan/status`
//! and `/scan/history` work after the in-memory session is gone.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use gsf_common::{Error, Result};

use crate::models::{LocationQuery, ScanPhase, ScanSession, ScanWarning};
use crate::utils::retry_on_lock;

/// Reason recorded on sessions left running by a previous process
pub const INTERRUPTED_REASON: &str = "interrupted";

pub async fn save_session(pool: &SqlitePool, session: &ScanSession, max_wait_ms: u64) -> Result<()> {
    let session_id = session.session_id.to_string();
    let query = serde_json::to_string(&session.query)?;
    let warnings = serde_json::to_string(&session.warnings)?;
    let started_at = session.started_at.to_rfc3339();
    let ended_at = session.ended_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("save_session", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO scan_sessions (
                session_id, query, phase, progress, discovered, analyzed, failed,
                warnings, error, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                phase = excluded.phase,
                progress = excluded.progress,
                discovered = excluded.discovered,
                analyzed = excluded.analyzed,
                failed = excluded.failed,
                warnings = excluded.warnings,
                error = excluded.error,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&session_id)
        .bind(&query)
        .bind(session.phase.label())
        .bind(session.progress as i64)
        .bind(session.discovered as i64)
        .bind(session.analyzed as i64)
        .bind(session.failed as i64)
        .bind(&warnings)
        .bind(&session.error)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;

        Ok::<(), Error>(())
    })
    .await
}

const SELECT_COLUMNS: &str = "SELECT session_id, query, phase, progress, discovered, analyzed, \
     failed, warnings, error, started_at, ended_at FROM scan_sessions";

pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<ScanSession>> {
    let row = sqlx::query(&format!("{} WHERE session_id = ?", SELECT_COLUMNS))
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Archived sessions, newest first
pub async fn list_history(pool: &SqlitePool, limit: i64) -> Result<Vec<ScanSession>> {
    let rows = sqlx::query(&format!(
        "{} ORDER BY started_at DESC LIMIT ?",
        SELECT_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(session_from_row).collect()
}

pub async fn has_running_session(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM scan_sessions WHERE phase IN ('discovering', 'analyzing')",
    )
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Fail every non-terminal session; run at startup before accepting scans
pub async fn mark_interrupted_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE scan_sessions
        SET phase = 'failed', error = ?, ended_at = ?
        WHERE phase IN ('discovering', 'analyzing')
        "#,
    )
    .bind(INTERRUPTED_REASON)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let affected = result.rows_affected();
    if affected > 0 {
        tracing::warn!(sessions = affected, "Marked interrupted scan sessions as failed");
    }
    Ok(affected)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanSession> {
    let session_id: String = row.get("session_id");
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|e| Error::Internal(format!("Invalid session id: {}", e)))?;

    let query: String = row.get("query");
    let query: LocationQuery = serde_json::from_str(&query)?;

    let phase: String = row.get("phase");
    let phase = ScanPhase::from_label(&phase)
        .ok_or_else(|| Error::Internal(format!("Unknown scan phase: {}", phase)))?;

    let warnings: String = row.get("warnings");
    let warnings: Vec<ScanWarning> = serde_json::from_str(&warnings)?;

    let started_at: String = row.get("started_at");
    let ended_at: Option<String> = row.get("ended_at");

    Ok(ScanSession {
        session_id,
        query,
        phase,
        progress: row.get::<i64, _>("progress").clamp(0, 100) as u8,
        discovered: row.get::<i64, _>("discovered") as usize,
        analyzed: row.get::<i64, _>("analyzed") as usize,
        failed: row.get::<i64, _>("failed") as usize,
        warnings,
        error: row.get("error"),
        started_at: parse_timestamp(&started_at, "started_at")?,
        ended_at: ended_at
            .as_deref()
            .map(|s| parse_timestamp(s, "ended_at"))
            .transpose()?,
    })
}
