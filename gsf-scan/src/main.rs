//! gsf-scan - Site discovery and capacity scan microservice
//!
//! Accepts location queries over HTTP, discovers candidate sites through the
//! discovery service, enriches each one with capacity and ownership estimates,
//! and stores completed sites in SQLite. Progress is streamed over SSE.

use anyhow::{Context, Result};
use clap::Parser;
use gsf_common::config::{self as bootstrap, TomlConfig};
use gsf_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gsf_scan::config::resolve_service_endpoints;
use gsf_scan::db::settings::PipelineSettings;
use gsf_scan::services::{
    CapacityEstimator, EnrichmentEngine, HttpCapacityClient, HttpDiscoveryClient,
    HttpOwnershipClient, OwnershipDetector, ScanPipeline, ScanStore, SiteDiscovery,
    SqliteScanStore,
};
use gsf_scan::AppState;

const DEFAULT_PORT: u16 = 5730;
const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "gsf-scan", version, about = "Site discovery and capacity scan service")]
struct Args {
    /// HTTP port
    #[arg(long, env = "GSF_PORT")]
    port: Option<u16>,

    /// Folder holding the database
    #[arg(long, env = "GSF_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/gsf/config.toml)
    #[arg(long, env = "GSF_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing(toml_config: &TomlConfig) {
    // RUST_LOG wins over the TOML level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&toml_config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(bootstrap::default_config_path);
    let toml_config = match &config_path {
        Some(path) => bootstrap::load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&toml_config);

    info!("Starting gsf-scan (site scan) microservice");
    info!(
        "gsf-scan v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: Resolve and prepare root folder
    let root_folder =
        bootstrap::resolve_root_folder(args.root_folder.as_deref(), "GSF_ROOT_FOLDER", &toml_config);
    let db_path = bootstrap::prepare_root_folder(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Database: {}", db_path.display());

    // Step 2: Open or create database
    let db_pool = gsf_scan::db::init_database_pool(&db_path).await?;
    gsf_scan::db::sessions::mark_interrupted_sessions(&db_pool).await?;

    // Step 3: Runtime settings and service endpoints
    let settings = PipelineSettings::load(&db_pool).await?;
    info!(?settings, "Pipeline settings loaded");
    let endpoints = resolve_service_endpoints(&db_pool, &toml_config).await?;

    // Step 4: Remote clients and pipeline
    let discovery: Arc<dyn SiteDiscovery> = Arc::new(HttpDiscoveryClient::new(
        endpoints.discovery_url.clone(),
        settings.discovery_timeout(),
        settings.requests_per_second,
    )?);
    let capacity: Arc<dyn CapacityEstimator> = Arc::new(HttpCapacityClient::new(
        endpoints.capacity_url.clone(),
        settings.analysis_timeout(),
        settings.requests_per_second,
    )?);
    let ownership: Option<Arc<dyn OwnershipDetector>> = match &endpoints.ownership_url {
        Some(url) => Some(Arc::new(HttpOwnershipClient::new(
            url.clone(),
            settings.analysis_timeout(),
            settings.requests_per_second,
        )?)),
        None => None,
    };

    let enrichment = Arc::new(EnrichmentEngine::new(
        capacity,
        ownership,
        settings.analysis_timeout(),
    ));
    let store: Arc<dyn ScanStore> = Arc::new(SqliteScanStore::new(
        db_pool.clone(),
        settings.database_max_lock_wait_ms,
    ));

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let pipeline = Arc::new(ScanPipeline::new(
        discovery,
        enrichment,
        Some(store),
        event_bus.clone(),
        settings,
    ));

    let state = AppState::new(db_pool, event_bus, pipeline);
    let app = gsf_scan::build_router(state);

    // Step 5: Serve
    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
