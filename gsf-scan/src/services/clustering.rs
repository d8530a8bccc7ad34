//! Map clustering
//!
//! Greedy, order-dependent grouping: each unprocessed site with coordinates anchors
//! a new cluster and pulls in every later unprocessed site closer than the radius
//! (planar distance in degrees). The anchor's coordinates are the cluster centroid.

use gsf_common::geo::planar_distance_degrees;
use gsf_common::{Coordinates, SiteRecord};
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_CLUSTER_RADIUS_DEGREES: f64 = 0.1;

/// Aggregate map marker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub centroid: Coordinates,
    pub member_ids: Vec<String>,
    /// Sum of member `capacity_estimate.max`
    pub total_free_mw: f64,
    /// Mean member confidence, 0 - 100
    pub average_confidence: f64,
    pub count: usize,
    #[serde(skip)]
    confidence_sum: f64,
    #[serde(skip)]
    confidence_members: usize,
}

impl Cluster {
    fn anchored_at(site: &SiteRecord, centroid: Coordinates) -> Self {
        let mut cluster = Self {
            centroid,
            member_ids: Vec::new(),
            total_free_mw: 0.0,
            average_confidence: 0.0,
            count: 0,
            confidence_sum: 0.0,
            confidence_members: 0,
        };
        cluster.push_member(site);
        cluster
    }

    /// Add a site and refresh the aggregates
    pub fn push_member(&mut self, site: &SiteRecord) {
        self.member_ids.push(site.id.clone());
        self.count = self.member_ids.len();

        if let Some(estimate) = site.capacity_estimate {
            self.total_free_mw += estimate.max;
            self.confidence_sum += estimate.confidence_percent();
            self.confidence_members += 1;
        }

        self.average_confidence = if self.confidence_members == 0 {
            0.0
        } else {
            self.confidence_sum / self.confidence_members as f64
        };
    }
}

/// Group `sites` into clusters of radius `radius_degrees`
///
/// Sites without coordinates are left out. Identical input gives identical output.
pub fn cluster_sites(sites: &[SiteRecord], radius_degrees: f64) -> Vec<Cluster> {
    let mut processed: HashSet<usize> = HashSet::with_capacity(sites.len());
    let mut clusters = Vec::new();

    for (i, anchor) in sites.iter().enumerate() {
        if processed.contains(&i) {
            continue;
        }
        let Some(anchor_coords) = anchor.coordinates else {
            continue;
        };
        processed.insert(i);

        let mut cluster = Cluster::anchored_at(anchor, anchor_coords);

        for (j, candidate) in sites.iter().enumerate().skip(i + 1) {
            if processed.contains(&j) {
                continue;
            }
            let Some(coords) = candidate.coordinates else {
                continue;
            };
            if planar_distance_degrees(&anchor_coords, &coords) < radius_degrees {
                cluster.push_member(candidate);
                processed.insert(j);
            }
        }

        clusters.push(cluster);
    }

    tracing::debug!(
        sites = sites.len(),
        clusters = clusters.len(),
        radius_degrees,
        "Clustered sites"
    );

    clusters
}
