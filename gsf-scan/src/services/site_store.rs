//! Persistence seam for the scan pipeline

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gsf_common::{CoordinatesSource, SiteRecord};
use sqlx::SqlitePool;

use crate::db;
use crate::error::PersistenceError;
use crate::models::ScanSession;

/// Where completed sites and session history are kept
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert or update by natural key; returns the write time
    async fn upsert_site(&self, site: &SiteRecord) -> Result<DateTime<Utc>, PersistenceError>;

    async fn load_sites(
        &self,
        source: Option<CoordinatesSource>,
    ) -> Result<Vec<SiteRecord>, PersistenceError>;

    async fn save_session(&self, session: &ScanSession) -> Result<(), PersistenceError>;
}

/// [`ScanStore`] backed by the service's SQLite database
#[derive(Clone)]
pub struct SqliteScanStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteScanStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ScanStore for SqliteScanStore {
    async fn upsert_site(&self, site: &SiteRecord) -> Result<DateTime<Utc>, PersistenceError> {
        if site.coordinates.is_none() {
            return Err(PersistenceError::MissingCoordinates(site.name.clone()));
        }
        Ok(db::sites::upsert_site(&self.pool, site, self.max_lock_wait_ms).await?)
    }

    async fn load_sites(
        &self,
        source: Option<CoordinatesSource>,
    ) -> Result<Vec<SiteRecord>, PersistenceError> {
        Ok(db::sites::load_sites(&self.pool, source).await?)
    }

    async fn save_session(&self, session: &ScanSession) -> Result<(), PersistenceError> {
        Ok(db::sessions::save_session(&self.pool, session, self.max_lock_wait_ms).await?)
    }
}
