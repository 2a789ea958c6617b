//! Batch enqueue outcome

use serde::Serialize;
use uuid::Uuid;

/// Why a track was left out of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTrack {
    pub track_id: Uuid,
    pub reason: String,
}

/// Result of `batch_review_all`
///
/// Per-track failures never abort the batch; they are reported here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub queued: usize,
    pub skipped: usize,
    pub job_ids: Vec<Uuid>,
    pub skipped_tracks: Vec<SkippedTrack>,
}

impl BatchResult {
    pub fn record_queued(&mut self, job_id: Uuid) {
        self.queued += 1;
        self.job_ids.push(job_id);
    }

    pub fn record_skipped(&mut self, track_id: Uuid, reason: impl Into<String>) {
        self.skipped += 1;
        self.skipped_tracks.push(SkippedTrack {
            track_id,
            reason: reason.into(),
        });
    }
}
