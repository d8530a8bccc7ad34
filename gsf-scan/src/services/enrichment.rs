//! Per-site enrichment
//!
//! Takes discovered `pending` sites through `analyzing` to `completed` or `failed`,
//! one site at a time. For every site the stream yields an interim `analyzing`
//! record followed by exactly one terminal record. A failing site never stops the
//! remaining sites.

use async_stream::stream;
use futures::Stream;
use gsf_common::{AnalysisStatus, CapacityEstimate, SiteDetails, SiteRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::capacity_client::{CapacityEstimator, CapacityRequest};
use super::ownership_client::{OwnershipDetector, OwnershipRequest};
use crate::error::EnrichmentError;
use crate::models::UtilityContext;

pub struct EnrichmentEngine {
    capacity: Arc<dyn CapacityEstimator>,
    ownership: Option<Arc<dyn OwnershipDetector>>,
    call_timeout: Duration,
}

impl EnrichmentEngine {
    pub fn new(
        capacity: Arc<dyn CapacityEstimator>,
        ownership: Option<Arc<dyn OwnershipDetector>>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            capacity,
            ownership,
            call_timeout,
        }
    }

    /// Enrich `sites` in order, stopping between sites once `cancel` fires
    ///
    /// Sites that are not `pending` are passed through unchanged.
    pub fn enrich<'a>(
        &'a self,
        sites: Vec<SiteRecord>,
        context: Option<UtilityContext>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = SiteRecord> + Send + 'a {
        stream! {
            for mut site in sites {
                if cancel.is_cancelled() {
                    tracing::info!(site = %site.name, "Enrichment cancelled before site");
                    break;
                }

                if site.analysis_status != AnalysisStatus::Pending {
                    tracing::warn!(
                        site = %site.name,
                        status = %site.analysis_status,
                        "Skipping site that is not pending"
                    );
                    yield site;
                    continue;
                }

                if let Err(e) = site.begin_analysis() {
                    tracing::error!(site = %site.name, error = %e, "Could not start analysis");
                    yield site;
                    continue;
                }
                yield site.clone();

                self.settle(&mut site, context.as_ref()).await;
                yield site;
            }
        }
    }

    /// Analyze a single site outside a scan, returning it in a terminal state
    pub async fn analyze_site(
        &self,
        mut site: SiteRecord,
        context: Option<&UtilityContext>,
    ) -> SiteRecord {
        if site.analysis_status == AnalysisStatus::Pending {
            if let Err(e) = site.begin_analysis() {
                tracing::error!(site = %site.name, error = %e, "Could not start analysis");
                return site;
            }
        }
        if site.analysis_status == AnalysisStatus::Analyzing {
            self.settle(&mut site, context).await;
        }
        site
    }

    /// Run the analysis and move an `analyzing` site to its terminal status
    async fn settle(&self, site: &mut SiteRecord, context: Option<&UtilityContext>) {
        let outcome = match self.assess(site, context).await {
            Ok((estimate, details)) => {
                tracing::debug!(
                    site = %site.name,
                    min = estimate.min,
                    max = estimate.max,
                    confidence = estimate.confidence,
                    "Site analyzed"
                );
                site.complete(estimate, details)
            }
            Err(e) => {
                tracing::warn!(site = %site.name, error = %e, "Site analysis failed");
                site.fail(e.to_string())
            }
        };

        if let Err(e) = outcome {
            tracing::error!(site = %site.name, error = %e, "Invalid site transition");
        }
    }

    async fn assess(
        &self,
        site: &SiteRecord,
        context: Option<&UtilityContext>,
    ) -> Result<(CapacityEstimate, SiteDetails), EnrichmentError> {
        let coordinates = site.coordinates.ok_or(EnrichmentError::MissingCoordinates)?;

        let request = CapacityRequest::new(&coordinates, context);
        let assessment = tokio::time::timeout(self.call_timeout, self.capacity.estimate(&request))
            .await
            .map_err(|_| EnrichmentError::Timeout(self.call_timeout))??;

        let mut details = SiteDetails {
            voltage_level: assessment.voltage_level,
            interconnection_type: assessment.interconnection_type,
            substation_type: assessment.substation_type,
            load_factor: assessment.load_factor,
            capacity_source: Some(self.capacity.source_id().to_string()),
            ..Default::default()
        };

        if let Some(ownership) = &self.ownership {
            let request = OwnershipRequest::new(&site.name, &site.address, &coordinates);
            match tokio::time::timeout(self.call_timeout, ownership.detect(&request)).await {
                Ok(Ok(result)) => {
                    details.owner = Some(result.owner);
                    details.ownership_confidence = Some(result.confidence);
                    details.ownership_source = Some(result.source).filter(|s| !s.is_empty());
                }
                Ok(Err(e)) => {
                    tracing::warn!(site = %site.name, error = %e, "Ownership detection failed");
                }
                Err(_) => {
                    tracing::warn!(
                        site = %site.name,
                        timeout_ms = self.call_timeout.as_millis() as u64,
                        "Ownership detection timed out"
                    );
                }
            }
        }

        Ok((assessment.estimate, details))
    }
}
