//! Scan session tracking
//!
//! A scan moves through
//!
//! ```text
//! discovering → analyzing → completed
//!      │             ├────→ cancelled
//!      └──→ failed ←─┘
//! ```
//!
//! Progress is weighted in two phases: discovery jumps straight to
//! [`DISCOVERY_WEIGHT`], then each terminal site outcome advances the remaining
//! [`ENRICHMENT_WEIGHT`] proportionally. Progress never decreases and only reaches
//! 100 once every discovered site has a terminal status.

use chrono::{DateTime, Utc};
use gsf_common::AnalysisStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScanError;
use crate::models::LocationQuery;

/// Share of the progress bar credited once discovery returns
pub const DISCOVERY_WEIGHT: u8 = 25;
/// Share of the progress bar spread across per-site enrichment
pub const ENRICHMENT_WEIGHT: u8 = 100 - DISCOVERY_WEIGHT;

/// Scan phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    /// Waiting on the discovery service
    Discovering,
    /// Enriching discovered sites one at a time
    Analyzing,
    /// Every discovered site reached a terminal status
    Completed,
    /// Discovery failed; no sites were enrolled
    Failed,
    /// Stopped between sites on request
    Cancelled,
}

impl ScanPhase {
    /// Label shown next to the progress bar
    pub fn label(&self) -> &'static str {
        match self {
            ScanPhase::Discovering => "discovering",
            ScanPhase::Analyzing => "analyzing",
            ScanPhase::Completed => "completed",
            ScanPhase::Failed => "failed",
            ScanPhase::Cancelled => "cancelled",
        }
    }

    pub fn from_label(label: &str) -> Option<ScanPhase> {
        match label {
            "discovering" => Some(ScanPhase::Discovering),
            "analyzing" => Some(ScanPhase::Analyzing),
            "completed" => Some(ScanPhase::Completed),
            "failed" => Some(ScanPhase::Failed),
            "cancelled" => Some(ScanPhase::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanPhase::Completed | ScanPhase::Failed | ScanPhase::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: ScanPhase) -> bool {
        matches!(
            (self, next),
            (ScanPhase::Discovering, ScanPhase::Analyzing)
                | (ScanPhase::Discovering, ScanPhase::Failed)
                | (ScanPhase::Discovering, ScanPhase::Cancelled)
                | (ScanPhase::Analyzing, ScanPhase::Completed)
                | (ScanPhase::Analyzing, ScanPhase::Failed)
                | (ScanPhase::Analyzing, ScanPhase::Cancelled)
        )
    }
}

/// Phase transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub session_id: Uuid,
    pub old_phase: ScanPhase,
    pub new_phase: ScanPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// Soft, non-fatal problem recorded against a scan (e.g. a failed write)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub site_name: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Bookkeeping for one discovery-through-enrichment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub session_id: Uuid,
    pub query: LocationQuery,
    pub phase: ScanPhase,
    /// 0 - 100
    pub progress: u8,
    pub discovered: usize,
    /// Sites that completed analysis
    pub analyzed: usize,
    /// Sites whose analysis failed
    pub failed: usize,
    pub warnings: Vec<ScanWarning>,
    /// Scan-level failure message (discovery errors)
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Progress after `processed` of `total` sites reached a terminal status
pub fn enrichment_progress(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return DISCOVERY_WEIGHT;
    }
    let processed = processed.min(total);
    let share = (processed * ENRICHMENT_WEIGHT as usize) / total;
    DISCOVERY_WEIGHT + share as u8
}

impl ScanSession {
    pub fn new(query: LocationQuery) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            query,
            phase: ScanPhase::Discovering,
            progress: 0,
            discovered: 0,
            analyzed: 0,
            failed: 0,
            warnings: Vec::new(),
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_phase`, stamping `ended_at` on terminal phases
    pub fn transition_to(&mut self, new_phase: ScanPhase) -> Result<PhaseTransition, ScanError> {
        if !self.phase.can_transition_to(new_phase) {
            return Err(ScanError::InvalidPhaseTransition {
                from: self.phase,
                to: new_phase,
            });
        }

        let transition = PhaseTransition {
            session_id: self.session_id,
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;

        if new_phase.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Ok(transition)
    }

    /// Discovery returned `count` sites: enter `analyzing` at the discovery weight
    pub fn discovery_completed(&mut self, count: usize) -> Result<PhaseTransition, ScanError> {
        let transition = self.transition_to(ScanPhase::Analyzing)?;
        self.discovered = count;
        self.raise_progress(DISCOVERY_WEIGHT);
        Ok(transition)
    }

    /// Count one terminal site outcome and recompute progress
    ///
    /// Non-terminal statuses are ignored. Returns the updated progress.
    pub fn record_site_outcome(&mut self, status: AnalysisStatus) -> u8 {
        match status {
            AnalysisStatus::Completed => self.analyzed += 1,
            AnalysisStatus::Failed => self.failed += 1,
            AnalysisStatus::Pending | AnalysisStatus::Analyzing => return self.progress,
        }
        self.raise_progress(enrichment_progress(self.processed(), self.discovered));
        self.progress
    }

    /// Sites that reached a terminal status
    pub fn processed(&self) -> usize {
        self.analyzed + self.failed
    }

    pub fn complete(&mut self) -> Result<PhaseTransition, ScanError> {
        let transition = self.transition_to(ScanPhase::Completed)?;
        if self.processed() >= self.discovered {
            self.raise_progress(100);
        }
        Ok(transition)
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<PhaseTransition, ScanError> {
        let transition = self.transition_to(ScanPhase::Failed)?;
        self.error = Some(error.into());
        Ok(transition)
    }

    pub fn cancel(&mut self) -> Result<PhaseTransition, ScanError> {
        self.transition_to(ScanPhase::Cancelled)
    }

    pub fn add_warning(&mut self, site_name: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ScanWarning {
            site_name: site_name.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    fn raise_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }
}
