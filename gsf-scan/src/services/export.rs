//! CSV export of site collections
//!
//! One denormalized row per site. Multi-value fields are semicolon-joined and any
//! field containing a comma, quote or line break is quoted.

use gsf_common::geo::haversine_km;
use gsf_common::{Coordinates, SiteRecord};

pub const CSV_HEADER: [&str; 16] = [
    "Name",
    "Address",
    "City",
    "State",
    "Latitude",
    "Longitude",
    "Status",
    "Capacity Min (MW)",
    "Capacity Max (MW)",
    "Confidence",
    "Owner",
    "Voltage Level",
    "Interconnection Type",
    "Distance (km)",
    "Sources",
    "Map Link",
];

/// Quote a CSV field when needed, doubling embedded quotes
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// City and state from `"street, City, ST 12345, Country"`
///
/// Returns empty strings when the address has too few parts.
pub fn parse_city_state(address: &str) -> (String, String) {
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() < 3 {
        return (String::new(), String::new());
    }

    let city = parts[1].to_string();
    let state = parts[2]
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    (city, state)
}

fn format_number(value: f64) -> String {
    format!("{:.2}", value)
}

fn row(site: &SiteRecord, reference: Option<&Coordinates>) -> Vec<String> {
    let (city, state) = parse_city_state(&site.address);
    let details = site.details.as_ref();
    let estimate = site.capacity_estimate.as_ref();

    let (latitude, longitude) = site
        .coordinates
        .map(|c| (format!("{:.6}", c.latitude), format!("{:.6}", c.longitude)))
        .unwrap_or_default();

    let distance = match (reference, site.coordinates.as_ref()) {
        (Some(reference), Some(coords)) => format_number(haversine_km(reference, coords)),
        _ => String::new(),
    };

    let sources: Vec<&str> = details
        .into_iter()
        .flat_map(|d| [d.capacity_source.as_deref(), d.ownership_source.as_deref()])
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();

    let text = |f: fn(&gsf_common::SiteDetails) -> Option<&String>| {
        details.and_then(f).cloned().unwrap_or_default()
    };

    vec![
        site.name.clone(),
        site.address.clone(),
        city,
        state,
        latitude,
        longitude,
        site.analysis_status.to_string(),
        estimate.map(|e| format_number(e.min)).unwrap_or_default(),
        estimate.map(|e| format_number(e.max)).unwrap_or_default(),
        estimate
            .map(|e| format!("{:.0}", e.confidence_percent()))
            .unwrap_or_default(),
        text(|d| d.owner.as_ref()),
        text(|d| d.voltage_level.as_ref()),
        text(|d| d.interconnection_type.as_ref()),
        distance,
        sources.join(";"),
        site.map_link().unwrap_or_default(),
    ]
}

/// Render `sites` as CSV text, header first
///
/// `reference` fills the distance column when given.
pub fn export_csv(sites: &[SiteRecord], reference: Option<&Coordinates>) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for site in sites {
        let fields: Vec<String> = row(site, reference)
            .iter()
            .map(|f| escape_field(f))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}
