//! Server-Sent Events for job progress
//!
//! Push alternative to polling `GET /projects/:id/jobs`. Events are
//! best-effort: a lagging client skips ahead and should re-fetch the job
//! list to resynchronize.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only forward events of this project
    pub project_id: Option<Uuid>,
}

/// GET /jobs/events[?project_id=...]
///
/// Streams JobQueued, JobStarted, JobProgress, JobCompleted, JobFailed and
/// TrackStatusChanged.
pub async fn job_event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(project_id = ?filter.project_id, "New SSE client connected to job events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE client lagged; events dropped");
                    yield Ok(Event::default().event("Lagged").data(skipped.to_string()));
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if filter.project_id.is_some_and(|id| id != event.project_id()) {
                continue;
            }

            let event_type = event.event_type();
            match serde_json::to_string(&event) {
                Ok(event_json) => {
                    debug!("SSE: Broadcasting job event: {}", event_type);
                    yield Ok(Event::default().event(event_type).data(event_json));
                }
                Err(e) => {
                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
