//! HTTP API handlers for gsf-scan

pub mod health;
pub mod scan;
pub mod sites;
pub mod sse;

pub use health::health_routes;
pub use scan::scan_routes;
pub use sites::site_routes;
pub use sse::scan_event_stream;
