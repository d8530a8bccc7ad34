//! # GSF Common Library
//!
//! Shared code for the Grid Site Finder services:
//! - Site record model (coordinates, capacity estimates, analysis status)
//! - Geospatial distance helpers
//! - Event types (ScanEvent enum) and the broadcast EventBus
//! - Configuration loading and root folder resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod site;

pub use error::{Error, Result};
pub use geo::Coordinates;
pub use site::{AnalysisStatus, CapacityEstimate, CoordinatesSource, SiteDetails, SiteRecord};
