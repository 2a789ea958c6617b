//! Event types and the in-process event bus
//!
//! Every job and track transition is announced on the `EventBus`. The SSE
//! endpoint forwards these to connected clients; nothing in the pipeline
//! depends on an event being received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// mixcritic event types
///
/// Statuses and job types travel as their wire strings (`"analyzing"`,
/// `"analyze_and_review"`) so subscribers do not need the service's enums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MixEvent {
    /// Job row created in `queued`
    JobQueued {
        job_id: Uuid,
        project_id: Uuid,
        track_id: Option<Uuid>,
        job_type: String,
        /// Set when this job retries a failed one
        retried_from: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Worker claimed the job (`queued` → `running`)
    JobStarted {
        job_id: Uuid,
        project_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Advisory progress tick
    JobProgress {
        job_id: Uuid,
        project_id: Uuid,
        /// 0-100
        progress: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job reached `complete`
    JobCompleted {
        job_id: Uuid,
        project_id: Uuid,
        /// Review created by this job, if it produces one
        review_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Job reached `error`
    JobFailed {
        job_id: Uuid,
        project_id: Uuid,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Track status changed
    TrackStatusChanged {
        track_id: Uuid,
        project_id: Uuid,
        old_status: String,
        new_status: String,
        timestamp: DateTime<Utc>,
    },
}

impl MixEvent {
    /// Get event type as string for filtering and SSE event names
    pub fn event_type(&self) -> &str {
        match self {
            MixEvent::JobQueued { .. } => "JobQueued",
            MixEvent::JobStarted { .. } => "JobStarted",
            MixEvent::JobProgress { .. } => "JobProgress",
            MixEvent::JobCompleted { .. } => "JobCompleted",
            MixEvent::JobFailed { .. } => "JobFailed",
            MixEvent::TrackStatusChanged { .. } => "TrackStatusChanged",
        }
    }

    /// Project the event belongs to
    pub fn project_id(&self) -> Uuid {
        match self {
            MixEvent::JobQueued { project_id, .. }
            | MixEvent::JobStarted { project_id, .. }
            | MixEvent::JobProgress { project_id, .. }
            | MixEvent::JobCompleted { project_id, .. }
            | MixEvent::JobFailed { project_id, .. }
            | MixEvent::TrackStatusChanged { project_id, .. } => *project_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// observe `Lagged` and skip ahead, receivers clean up on drop.
///
/// # Examples
///
/// ```
/// use mixcritic_common::events::{EventBus, MixEvent};
/// use uuid::Uuid;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(MixEvent::JobStarted {
///     job_id: Uuid::new_v4(),
///     project_id: Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MixEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MixEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: MixEvent) -> Result<usize, broadcast::error::SendError<MixEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MixEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
