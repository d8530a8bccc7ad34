//! Test Helper Utilities
//!
//! Shared fakes and app construction for gsf-scan integration tests

#![allow(dead_code)]

pub mod fakes;

pub use fakes::{
    site, three_sites, FakeCapacity, FakeDiscovery, FakeOwnership, FlakyStore,
};

use gsf_common::events::{EventBus, ScanEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use gsf_scan::db::settings::PipelineSettings;
use gsf_scan::services::{
    CapacityEstimator, EnrichmentEngine, OwnershipDetector, ScanPipeline, ScanStore, SiteDiscovery,
    SqliteScanStore,
};
use gsf_scan::AppState;

pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub fn build_pipeline(
    discovery: Arc<dyn SiteDiscovery>,
    capacity: Arc<dyn CapacityEstimator>,
    ownership: Option<Arc<dyn OwnershipDetector>>,
    store: Option<Arc<dyn ScanStore>>,
    event_bus: EventBus,
) -> Arc<ScanPipeline> {
    let enrichment = Arc::new(EnrichmentEngine::new(capacity, ownership, CALL_TIMEOUT));
    Arc::new(ScanPipeline::new(
        discovery,
        enrichment,
        store,
        event_bus,
        PipelineSettings::default(),
    ))
}

/// App backed by an in-memory database, the given discovery fake and a healthy
/// capacity fake
pub async fn create_test_app_with(
    discovery: Arc<dyn SiteDiscovery>,
    capacity: Arc<dyn CapacityEstimator>,
) -> (axum::Router, AppState) {
    let pool = gsf_scan::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    let event_bus = EventBus::new(256);
    let store: Arc<dyn ScanStore> = Arc::new(SqliteScanStore::new(pool.clone(), 1_000));
    let pipeline = build_pipeline(discovery, capacity, None, Some(store), event_bus.clone());

    let state = AppState::new(pool, event_bus, pipeline);
    (gsf_scan::build_router(state.clone()), state)
}

pub async fn create_test_app() -> (axum::Router, AppState) {
    create_test_app_with(
        Arc::new(FakeDiscovery::returning(three_sites())),
        Arc::new(FakeCapacity::new()),
    )
    .await
}

/// Drain everything currently buffered on a subscription
pub fn drain(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll until the pipeline has no active scan
pub async fn wait_for_idle(pipeline: &ScanPipeline) {
    for _ in 0..200 {
        if pipeline.active_session_id().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan did not finish in time");
}

pub async fn stored_site_count(pool: &SqlitePool) -> i64 {
    gsf_scan::db::sites::count_sites(pool).await.unwrap()
}
