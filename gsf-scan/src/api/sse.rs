//! Server-Sent Events for scan progress
//!
//! GET /scan/events streams every [`ScanEvent`] as JSON with the variant name as
//! the SSE event type. `?session_id=` narrows the stream to one scan.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use gsf_common::events::ScanEvent;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamParams {
    pub session_id: Option<Uuid>,
}

fn to_sse(event: &ScanEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// GET /scan/events
pub async fn scan_event_stream(
    State(state): State<AppState>,
    Query(params): Query<EventStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_filter = ?params.session_id, "New SSE client connected to scan events");

    let mut rx = state.event_bus.subscribe();
    let wanted = params.session_id;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if wanted.is_some_and(|id| id != event.session_id()) {
                        continue;
                    }
                    debug!("SSE: Forwarding {}", event.event_type());
                    if let Some(sse_event) = to_sse(&event) {
                        yield Ok(sse_event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client fell behind, events dropped");
                    yield Ok(Event::default().comment(format!("lagged {}", skipped)));
                }
                Err(RecvError::Closed) => {
                    info!("SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
