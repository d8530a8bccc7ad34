//! Settings database operations
//!
//! Key/value rows in the `settings` table. Missing keys fall back to the defaults
//! in [`PipelineSettings::default`].

use sqlx::{Pool, Sqlite};
use std::time::Duration;

use gsf_common::{Error, Result};

pub const DISCOVERY_URL_KEY: &str = "discovery_url";
pub const CAPACITY_URL_KEY: &str = "capacity_url";
pub const OWNERSHIP_URL_KEY: &str = "ownership_url";

/// Tunables read once per scan
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub discovery_timeout_ms: u64,
    /// Per remote call during enrichment
    pub analysis_timeout_ms: u64,
    pub search_radius_meters: f64,
    pub max_results: usize,
    pub cluster_radius_degrees: f64,
    pub requests_per_second: u32,
    pub database_max_lock_wait_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 30_000,
            analysis_timeout_ms: 30_000,
            search_radius_meters: 25_000.0,
            max_results: 50,
            cluster_radius_degrees: 0.1,
            requests_per_second: 2,
            database_max_lock_wait_ms: 5_000,
        }
    }
}

impl PipelineSettings {
    /// Read every tunable, using the default for any key not set
    pub async fn load(db: &Pool<Sqlite>) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            discovery_timeout_ms: get_setting(db, "discovery_timeout_ms")
                .await?
                .unwrap_or(d.discovery_timeout_ms),
            analysis_timeout_ms: get_setting(db, "analysis_timeout_ms")
                .await?
                .unwrap_or(d.analysis_timeout_ms),
            search_radius_meters: get_setting(db, "search_radius_meters")
                .await?
                .unwrap_or(d.search_radius_meters),
            max_results: get_setting(db, "max_results").await?.unwrap_or(d.max_results),
            cluster_radius_degrees: get_setting(db, "cluster_radius_degrees")
                .await?
                .unwrap_or(d.cluster_radius_degrees),
            requests_per_second: get_setting(db, "requests_per_second")
                .await?
                .unwrap_or(d.requests_per_second),
            database_max_lock_wait_ms: get_setting(db, "database_max_lock_wait_ms")
                .await?
                .unwrap_or(d.database_max_lock_wait_ms),
        })
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }
}

/// Service endpoint stored under `key`; empty values count as unset
pub async fn get_endpoint(db: &Pool<Sqlite>, key: &str) -> Result<Option<String>> {
    Ok(get_setting::<String>(db, key)
        .await?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

pub async fn set_endpoint(db: &Pool<Sqlite>, key: &str, url: &str) -> Result<()> {
    set_setting(db, key, url).await
}

pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((value,)) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Setting '{}' is invalid: {}", key, e))),
        None => Ok(None),
    }
}

pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
