//! Service endpoint resolution
//!
//! Each remote service URL is looked up in priority order: database `settings` row,
//! then environment variable, then the `[services]` table of the TOML config.
//! Discovery and capacity endpoints are required; ownership detection is optional.

use gsf_common::config::TomlConfig;
use gsf_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::db::settings::{self, CAPACITY_URL_KEY, DISCOVERY_URL_KEY, OWNERSHIP_URL_KEY};

pub const DISCOVERY_URL_ENV: &str = "GSF_DISCOVERY_URL";
pub const CAPACITY_URL_ENV: &str = "GSF_CAPACITY_URL";
pub const OWNERSHIP_URL_ENV: &str = "GSF_OWNERSHIP_URL";

/// Resolved remote service base URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub discovery_url: String,
    pub capacity_url: String,
    pub ownership_url: Option<String>,
}

fn usable(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve one endpoint; `Ok(None)` when no tier provides it
pub async fn resolve_endpoint(
    db: &Pool<Sqlite>,
    key: &str,
    env_var: &str,
    toml_value: Option<&str>,
) -> Result<Option<String>> {
    let db_value = settings::get_endpoint(db, key).await?;
    let env_value = usable(std::env::var(env_var).ok().as_deref());
    let toml_value = usable(toml_value);

    let sources: Vec<&str> = [
        db_value.as_ref().map(|_| "database"),
        env_value.as_ref().map(|_| "environment"),
        toml_value.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            key,
            sources.join(", "),
            sources[0]
        );
    }

    let resolved = db_value.or(env_value).or(toml_value);
    if let (Some(url), Some(source)) = (&resolved, sources.first()) {
        info!("{} loaded from {}: {}", key, source, url);
    }
    Ok(resolved)
}

pub async fn resolve_service_endpoints(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<ServiceEndpoints> {
    let services = &toml_config.services;

    let discovery_url = resolve_endpoint(
        db,
        DISCOVERY_URL_KEY,
        DISCOVERY_URL_ENV,
        services.discovery_url.as_deref(),
    )
    .await?
    .ok_or_else(|| missing(DISCOVERY_URL_KEY, DISCOVERY_URL_ENV))?;

    let capacity_url = resolve_endpoint(
        db,
        CAPACITY_URL_KEY,
        CAPACITY_URL_ENV,
        services.capacity_url.as_deref(),
    )
    .await?
    .ok_or_else(|| missing(CAPACITY_URL_KEY, CAPACITY_URL_ENV))?;

    let ownership_url = resolve_endpoint(
        db,
        OWNERSHIP_URL_KEY,
        OWNERSHIP_URL_ENV,
        services.ownership_url.as_deref(),
    )
    .await?;

    if ownership_url.is_none() {
        info!("No ownership service configured; sites will be analyzed without owner data");
    }

    Ok(ServiceEndpoints {
        discovery_url,
        capacity_url,
        ownership_url,
    })
}

fn missing(key: &str, env_var: &str) -> Error {
    Error::Config(format!(
        "{key} not configured. Set it using one of:\n\
         1. Database: settings row '{key}'\n\
         2. Environment: {env_var}=http://host:port\n\
         3. TOML config: [services] {key} = \"http://host:port\""
    ))
}
