//! Site filter engine
//!
//! Every [`FilterSpec`] field is optional and the set is ANDed together. The default
//! filter constrains nothing, so clearing filters gives back the input collection.

use gsf_common::geo::haversine_km;
use gsf_common::{AnalysisStatus, Coordinates, Error, Result, SiteRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire label meaning "no constraint" for every bucketed filter
pub const ALL_LABEL: &str = "all";

/// Status filter; `all` bypasses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(AnalysisStatus),
}

impl StatusFilter {
    fn matches(&self, status: AnalysisStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case(ALL_LABEL) {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

/// Capacity range tested against `capacity_estimate.max` (MW), lower bound inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapacityBucket {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "0-50")]
    UpTo50,
    #[serde(rename = "50-100")]
    From50To100,
    #[serde(rename = "100-250")]
    From100To250,
    #[serde(rename = "250-500")]
    From250To500,
    #[serde(rename = "500+")]
    Over500,
}

impl CapacityBucket {
    pub const ALL: [CapacityBucket; 6] = [
        CapacityBucket::All,
        CapacityBucket::UpTo50,
        CapacityBucket::From50To100,
        CapacityBucket::From100To250,
        CapacityBucket::From250To500,
        CapacityBucket::Over500,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CapacityBucket::All => ALL_LABEL,
            CapacityBucket::UpTo50 => "0-50",
            CapacityBucket::From50To100 => "50-100",
            CapacityBucket::From100To250 => "100-250",
            CapacityBucket::From250To500 => "250-500",
            CapacityBucket::Over500 => "500+",
        }
    }

    /// `[lower, upper)` in MW; None for `all`
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            CapacityBucket::All => None,
            CapacityBucket::UpTo50 => Some((0.0, 50.0)),
            CapacityBucket::From50To100 => Some((50.0, 100.0)),
            CapacityBucket::From100To250 => Some((100.0, 250.0)),
            CapacityBucket::From250To500 => Some((250.0, 500.0)),
            CapacityBucket::Over500 => Some((500.0, f64::INFINITY)),
        }
    }

    fn matches(&self, site: &SiteRecord) -> bool {
        let Some((lower, upper)) = self.range() else {
            return true;
        };
        site.capacity_estimate
            .map(|c| c.max >= lower && c.max < upper)
            .unwrap_or(false)
    }
}

impl fmt::Display for CapacityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CapacityBucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        CapacityBucket::ALL
            .into_iter()
            .find(|b| b.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown capacity bucket: {}", s)))
    }
}

/// Confidence band over `capacity_estimate.confidence` (0-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    #[default]
    All,
    /// >= 0.8
    High,
    /// 0.6 up to 0.8
    Medium,
    /// < 0.6
    Low,
}

impl ConfidenceBucket {
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceBucket::All => ALL_LABEL,
            ConfidenceBucket::High => "high",
            ConfidenceBucket::Medium => "medium",
            ConfidenceBucket::Low => "low",
        }
    }

    fn matches(&self, site: &SiteRecord) -> bool {
        let confidence = match (self, site.capacity_estimate) {
            (ConfidenceBucket::All, _) => return true,
            (_, None) => return false,
            (_, Some(estimate)) => estimate.confidence,
        };
        match self {
            ConfidenceBucket::All => true,
            ConfidenceBucket::High => confidence >= 0.8,
            ConfidenceBucket::Medium => (0.6..0.8).contains(&confidence),
            ConfidenceBucket::Low => confidence < 0.6,
        }
    }
}

impl fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ConfidenceBucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ConfidenceBucket::All),
            "high" => Ok(ConfidenceBucket::High),
            "medium" => Ok(ConfidenceBucket::Medium),
            "low" => Ok(ConfidenceBucket::Low),
            other => Err(Error::InvalidInput(format!("Unknown confidence bucket: {}", other))),
        }
    }
}

/// Great-circle radius around a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub center: Coordinates,
    pub radius_km: f64,
}

impl Proximity {
    fn matches(&self, site: &SiteRecord) -> bool {
        site.coordinates
            .map(|c| haversine_km(&self.center, &c) <= self.radius_km)
            .unwrap_or(false)
    }
}

/// Composable site predicate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// Case-insensitive substring of name or address
    pub search_term: Option<String>,
    pub status: StatusFilter,
    pub capacity_bucket: CapacityBucket,
    /// Case-insensitive substring of address
    pub location_substring: Option<String>,
    pub confidence_bucket: ConfidenceBucket,
    pub proximity: Option<Proximity>,
}

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn normalized_term(term: &Option<String>) -> Option<String> {
    term.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl FilterSpec {
    /// True when no field constrains anything
    pub fn is_unconstrained(&self) -> bool {
        normalized_term(&self.search_term).is_none()
            && normalized_term(&self.location_substring).is_none()
            && self.status == StatusFilter::All
            && self.capacity_bucket == CapacityBucket::All
            && self.confidence_bucket == ConfidenceBucket::All
            && self.proximity.is_none()
    }

    /// Reset every field to its unconstrained default
    pub fn clear(&mut self) {
        *self = FilterSpec::default();
    }

    pub fn matches(&self, site: &SiteRecord) -> bool {
        self.compile().matches(site)
    }

    fn compile(&self) -> CompiledFilter<'_> {
        CompiledFilter {
            spec: self,
            search: normalized_term(&self.search_term),
            location: normalized_term(&self.location_substring),
        }
    }
}

/// Filter with its text terms lower-cased once
struct CompiledFilter<'a> {
    spec: &'a FilterSpec,
    search: Option<String>,
    location: Option<String>,
}

impl CompiledFilter<'_> {
    fn matches(&self, site: &SiteRecord) -> bool {
        if let Some(term) = &self.search {
            if !contains_ignore_case(&site.name, term) && !contains_ignore_case(&site.address, term)
            {
                return false;
            }
        }
        if let Some(term) = &self.location {
            if !contains_ignore_case(&site.address, term) {
                return false;
            }
        }

        self.spec.status.matches(site.analysis_status)
            && self.spec.capacity_bucket.matches(site)
            && self.spec.confidence_bucket.matches(site)
            && self.spec.proximity.map(|p| p.matches(site)).unwrap_or(true)
    }
}

/// Sites matching `spec`, in input order
pub fn filter_sites(sites: &[SiteRecord], spec: &FilterSpec) -> Vec<SiteRecord> {
    let compiled = spec.compile();
    sites
        .iter()
        .filter(|site| compiled.matches(site))
        .cloned()
        .collect()
}
