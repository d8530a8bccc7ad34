//! Data models for gsf-scan
//!
//! - Scan session state machine and progress weighting
//! - Location queries and scan requests

pub mod query;
pub mod scan_session;

pub use query::{LocationQuery, ScanRequest, UtilityContext};
pub use scan_session::{
    enrichment_progress, PhaseTransition, ScanPhase, ScanSession, ScanWarning,
    DISCOVERY_WEIGHT, ENRICHMENT_WEIGHT,
};
