//! Services for gsf-scan
//!
//! Remote clients (discovery, capacity, ownership), the enrichment engine, the scan
//! pipeline, and the presentation helpers (filter, clustering, export).

pub mod capacity_client;
pub mod clustering;
pub mod discovery_client;
pub mod enrichment;
pub mod export;
pub mod filter;
mod http_support;
pub mod ownership_client;
pub mod pipeline;
pub mod site_store;

pub use capacity_client::{
    CapacityAssessment, CapacityEstimator, CapacityRequest, HttpCapacityClient,
};
pub use clustering::{cluster_sites, Cluster, DEFAULT_CLUSTER_RADIUS_DEGREES};
pub use discovery_client::{DiscoveryLimits, HttpDiscoveryClient, SiteDiscovery};
pub use enrichment::EnrichmentEngine;
pub use export::export_csv;
pub use filter::{
    filter_sites, CapacityBucket, ConfidenceBucket, FilterSpec, Proximity, StatusFilter,
};
pub use ownership_client::{HttpOwnershipClient, OwnershipDetector, OwnershipRequest, OwnershipResult};
pub use pipeline::{ScanHandle, ScanPipeline};
pub use site_store::{ScanStore, SqliteScanStore};
