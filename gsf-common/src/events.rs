//! Event types for the GSF event system
//!
//! Scan progress is broadcast as [`ScanEvent`]s on an [`EventBus`]. The HTTP layer
//! forwards them to browsers over SSE; tests subscribe directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::site::SiteRecord;

/// Scan pipeline events
///
/// Serialized with a `type` tag so SSE clients can switch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// A scan session was accepted and discovery is starting
    ScanStarted {
        session_id: Uuid,
        /// Human-readable form of the location query
        query: String,
        timestamp: DateTime<Utc>,
    },

    /// Discovery returned its candidate set; enrichment is about to begin
    DiscoveryCompleted {
        session_id: Uuid,
        discovered: usize,
        timestamp: DateTime<Utc>,
    },

    /// A site changed analysis state (interim `analyzing` or terminal)
    SiteUpdated {
        session_id: Uuid,
        site: SiteRecord,
        timestamp: DateTime<Utc>,
    },

    /// Overall progress of the running scan
    ///
    /// Triggers:
    /// - SSE: Update progress bar and phase label
    ScanProgress {
        session_id: Uuid,
        phase: String,
        /// 0 - 100, never decreasing within a scan
        progress: u8,
        discovered: usize,
        analyzed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A completed site could not be stored; the scan carries on
    PersistenceWarning {
        session_id: Uuid,
        site_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    ScanCompleted {
        session_id: Uuid,
        discovered: usize,
        analyzed: usize,
        failed: usize,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Scan aborted (discovery failure); reported once per scan
    ScanFailed {
        session_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    ScanCancelled {
        session_id: Uuid,
        /// Sites that reached a terminal status before cancellation
        processed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::ScanStarted { .. } => "ScanStarted",
            ScanEvent::DiscoveryCompleted { .. } => "DiscoveryCompleted",
            ScanEvent::SiteUpdated { .. } => "SiteUpdated",
            ScanEvent::ScanProgress { .. } => "ScanProgress",
            ScanEvent::PersistenceWarning { .. } => "PersistenceWarning",
            ScanEvent::ScanCompleted { .. } => "ScanCompleted",
            ScanEvent::ScanFailed { .. } => "ScanFailed",
            ScanEvent::ScanCancelled { .. } => "ScanCancelled",
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            ScanEvent::ScanStarted { session_id, .. }
            | ScanEvent::DiscoveryCompleted { session_id, .. }
            | ScanEvent::SiteUpdated { session_id, .. }
            | ScanEvent::ScanProgress { session_id, .. }
            | ScanEvent::PersistenceWarning { session_id, .. }
            | ScanEvent::ScanCompleted { session_id, .. }
            | ScanEvent::ScanFailed { session_id, .. }
            | ScanEvent::ScanCancelled { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for [`ScanEvent`]s
///
/// Cloning is cheap; all clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScanEvent,
    ) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Progress chatter is only interesting to whoever happens to be watching.
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
