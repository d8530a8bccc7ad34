//! Scan pipeline
//!
//! Drives one scan at a time through discovery, sequential enrichment and
//! fire-and-forget persistence:
//!
//! ```text
//! start_scan ─→ discover ─→ enrich site 1 ─→ enrich site 2 ─→ … ─→ settle writes ─→ report
//!                              └─ upsert (spawned)  └─ upsert (spawned)
//! ```
//!
//! Only a discovery failure fails the scan. Per-site analysis failures mark that
//! site `failed`; storage failures become session warnings.

use chrono::Utc;
use futures::StreamExt;
use gsf_common::events::{EventBus, ScanEvent};
use gsf_common::{AnalysisStatus, SiteRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::discovery_client::{DiscoveryLimits, SiteDiscovery};
use super::enrichment::EnrichmentEngine;
use super::site_store::ScanStore;
use crate::db::settings::PipelineSettings;
use crate::error::{PersistenceError, ScanError};
use crate::models::{ScanRequest, ScanSession, UtilityContext};

/// Ticket for an admitted scan; pass to [`ScanPipeline::execute`]
#[derive(Debug)]
pub struct ScanHandle {
    pub session_id: Uuid,
    request: ScanRequest,
    cancel: CancellationToken,
}

struct ActiveScan {
    session_id: Uuid,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PipelineState {
    active: Option<ActiveScan>,
    /// Sessions run by this process, by id
    sessions: HashMap<Uuid, ScanSession>,
    /// Sites of the most recent scan, in discovery order
    current_sites: Vec<SiteRecord>,
}

type WriteOutcome = (usize, String, Result<chrono::DateTime<Utc>, PersistenceError>);

pub struct ScanPipeline {
    discovery: Arc<dyn SiteDiscovery>,
    enrichment: Arc<EnrichmentEngine>,
    store: Option<Arc<dyn ScanStore>>,
    event_bus: EventBus,
    settings: PipelineSettings,
    state: Mutex<PipelineState>,
}

impl ScanPipeline {
    pub fn new(
        discovery: Arc<dyn SiteDiscovery>,
        enrichment: Arc<EnrichmentEngine>,
        store: Option<Arc<dyn ScanStore>>,
        event_bus: EventBus,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            discovery,
            enrichment,
            store,
            event_bus,
            settings,
            state: Mutex::new(PipelineState::default()),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn store(&self) -> Option<&Arc<dyn ScanStore>> {
        self.store.as_ref()
    }

    fn state(&self) -> MutexGuard<'_, PipelineState> {
        // A panic elsewhere must not wedge the pipeline
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit a scan, or reject it while another is running
    pub fn start_scan(&self, request: ScanRequest) -> Result<(ScanHandle, ScanSession), ScanError> {
        request.query.validate()?;

        let session = ScanSession::new(request.query.clone());
        let cancel = CancellationToken::new();
        {
            let mut state = self.state();
            if let Some(active) = &state.active {
                tracing::warn!(
                    active_session = %active.session_id,
                    "Rejecting scan request while another scan is running"
                );
                return Err(ScanError::AlreadyRunning(active.session_id));
            }
            state.active = Some(ActiveScan {
                session_id: session.session_id,
                cancel: cancel.clone(),
            });
            state.sessions.insert(session.session_id, session.clone());
            state.current_sites.clear();
        }

        tracing::info!(
            session_id = %session.session_id,
            query = %request.query.describe(),
            "Scan started"
        );
        self.event_bus.emit_lossy(ScanEvent::ScanStarted {
            session_id: session.session_id,
            query: request.query.describe(),
            timestamp: Utc::now(),
        });

        Ok((
            ScanHandle {
                session_id: session.session_id,
                request,
                cancel,
            },
            session,
        ))
    }

    /// Run an admitted scan to its terminal phase and return the final session
    pub async fn execute(&self, handle: ScanHandle) -> ScanSession {
        let ScanHandle {
            session_id,
            request,
            cancel,
        } = handle;

        let mut session = self
            .session(session_id)
            .unwrap_or_else(|| ScanSession::new(request.query.clone()));
        self.persist_session(&session).await;

        let limits = DiscoveryLimits {
            default_radius_meters: self.settings.search_radius_meters,
            max_results: request.max_results.unwrap_or(self.settings.max_results),
        };

        let discovered = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.discovery.discover(&request.query, &limits) => Some(result),
        };

        let sites = match discovered {
            None => {
                if let Err(e) = session.cancel() {
                    tracing::error!(error = %e, "Could not cancel scan");
                }
                self.emit_cancelled(&session);
                return self.finish(session).await;
            }
            Some(Err(e)) => {
                tracing::error!(session_id = %session_id, error = %e, "Discovery failed");
                let message = e.to_string();
                if let Err(e) = session.fail(message.clone()) {
                    tracing::error!(error = %e, "Could not fail scan");
                }
                self.event_bus.emit_lossy(ScanEvent::ScanFailed {
                    session_id,
                    error: message,
                    timestamp: Utc::now(),
                });
                return self.finish(session).await;
            }
            Some(Ok(sites)) => sites,
        };

        if let Err(e) = session.discovery_completed(sites.len()) {
            tracing::error!(error = %e, "Could not enter analysis phase");
        }
        tracing::info!(session_id = %session_id, discovered = sites.len(), "Discovery completed");
        {
            let mut state = self.state();
            state.current_sites = sites.clone();
        }
        self.publish(&session);
        self.event_bus.emit_lossy(ScanEvent::DiscoveryCompleted {
            session_id,
            discovered: sites.len(),
            timestamp: Utc::now(),
        });
        self.emit_progress(&session);
        self.persist_session(&session).await;

        let mut writes: JoinSet<WriteOutcome> = JoinSet::new();
        let mut cursor = 0usize;

        let updates = self
            .enrichment
            .enrich(sites, request.context.clone(), cancel.clone());
        futures::pin_mut!(updates);

        while let Some(site) = updates.next().await {
            let status = site.analysis_status;
            let index = cursor;
            if status.is_terminal() {
                cursor += 1;
            }

            self.replace_site(index, &site);
            self.event_bus.emit_lossy(ScanEvent::SiteUpdated {
                session_id,
                site: site.clone(),
                timestamp: Utc::now(),
            });

            if !status.is_terminal() {
                continue;
            }

            session.record_site_outcome(status);
            self.publish(&session);
            self.emit_progress(&session);

            if status == AnalysisStatus::Completed {
                if let Some(store) = &self.store {
                    let store = Arc::clone(store);
                    writes.spawn(async move {
                        let result = store.upsert_site(&site).await;
                        (index, site.name, result)
                    });
                }
            }
        }

        self.settle_writes(&mut session, writes).await;

        if cancel.is_cancelled() && session.processed() < session.discovered {
            if let Err(e) = session.cancel() {
                tracing::error!(error = %e, "Could not cancel scan");
            }
            tracing::info!(
                session_id = %session_id,
                processed = session.processed(),
                "Scan cancelled"
            );
            self.emit_cancelled(&session);
        } else {
            if let Err(e) = session.complete() {
                tracing::error!(error = %e, "Could not complete scan");
            }
            tracing::info!(
                session_id = %session_id,
                analyzed = session.analyzed,
                failed = session.failed,
                warnings = session.warnings.len(),
                "Scan completed"
            );
            self.emit_progress(&session);
            self.event_bus.emit_lossy(ScanEvent::ScanCompleted {
                session_id,
                discovered: session.discovered,
                analyzed: session.analyzed,
                failed: session.failed,
                duration_seconds: session.elapsed_seconds(),
                timestamp: Utc::now(),
            });
        }

        self.finish(session).await
    }

    /// Wait for every spawned upsert; failures become warnings, successes stamp `stored_at`
    async fn settle_writes(&self, session: &mut ScanSession, mut writes: JoinSet<WriteOutcome>) {
        while let Some(joined) = writes.join_next().await {
            let (index, site_name, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Site write task failed");
                    session.add_warning("", format!("write task failed: {}", e));
                    continue;
                }
            };

            match result {
                Ok(stored_at) => {
                    let mut state = self.state();
                    if let Some(site) = state.current_sites.get_mut(index) {
                        site.stored_at = Some(stored_at);
                    }
                }
                Err(e) => {
                    tracing::warn!(site = %site_name, error = %e, "Failed to store site");
                    let message = e.to_string();
                    session.add_warning(site_name.clone(), message.clone());
                    self.event_bus.emit_lossy(ScanEvent::PersistenceWarning {
                        session_id: session.session_id,
                        site_name,
                        message,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
    }

    async fn finish(&self, session: ScanSession) -> ScanSession {
        self.persist_session(&session).await;
        let mut state = self.state();
        state.sessions.insert(session.session_id, session.clone());
        if state
            .active
            .as_ref()
            .is_some_and(|a| a.session_id == session.session_id)
        {
            state.active = None;
        }
        session
    }

    /// Request cooperative cancellation of the running scan
    pub fn cancel_scan(&self, session_id: Uuid) -> Result<(), ScanError> {
        let state = self.state();
        match &state.active {
            Some(active) if active.session_id == session_id => {
                active.cancel.cancel();
                tracing::info!(session_id = %session_id, "Scan cancellation requested");
                Ok(())
            }
            _ if state.sessions.contains_key(&session_id) => Err(ScanError::NotRunning(session_id)),
            _ => Err(ScanError::UnknownSession(session_id)),
        }
    }

    /// Latest snapshot of a session run by this process
    pub fn session(&self, session_id: Uuid) -> Option<ScanSession> {
        self.state().sessions.get(&session_id).cloned()
    }

    pub fn active_session_id(&self) -> Option<Uuid> {
        self.state().active.as_ref().map(|a| a.session_id)
    }

    /// Sites of the most recent scan with their latest status
    pub fn current_sites(&self) -> Vec<SiteRecord> {
        self.state().current_sites.clone()
    }

    /// Analyze one ad-hoc site outside any scan and store it when it completes
    pub async fn analyze_site(
        &self,
        site: SiteRecord,
        context: Option<&UtilityContext>,
    ) -> (SiteRecord, Option<String>) {
        let mut site = self.enrichment.analyze_site(site, context).await;
        let mut warning = None;

        if site.analysis_status == AnalysisStatus::Completed {
            if let Some(store) = &self.store {
                match store.upsert_site(&site).await {
                    Ok(stored_at) => site.stored_at = Some(stored_at),
                    Err(e) => {
                        tracing::warn!(site = %site.name, error = %e, "Failed to store ad-hoc site");
                        warning = Some(e.to_string());
                    }
                }
            }
        }

        (site, warning)
    }

    fn replace_site(&self, index: usize, site: &SiteRecord) {
        let mut state = self.state();
        match state.current_sites.get_mut(index) {
            Some(slot) if slot.id == site.id => *slot = site.clone(),
            _ => {
                if let Some(slot) = state
                    .current_sites
                    .iter_mut()
                    .find(|s| s.id == site.id && s.natural_key() == site.natural_key())
                {
                    *slot = site.clone();
                }
            }
        }
    }

    fn publish(&self, session: &ScanSession) {
        self.state()
            .sessions
            .insert(session.session_id, session.clone());
    }

    async fn persist_session(&self, session: &ScanSession) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_session(session).await {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Failed to archive scan session"
                );
            }
        }
    }

    fn emit_progress(&self, session: &ScanSession) {
        self.event_bus.emit_lossy(ScanEvent::ScanProgress {
            session_id: session.session_id,
            phase: session.phase.label().to_string(),
            progress: session.progress,
            discovered: session.discovered,
            analyzed: session.analyzed,
            failed: session.failed,
            timestamp: Utc::now(),
        });
    }

    fn emit_cancelled(&self, session: &ScanSession) {
        self.event_bus.emit_lossy(ScanEvent::ScanCancelled {
            session_id: session.session_id,
            processed: session.processed(),
            timestamp: Utc::now(),
        });
    }
}
