//! Stored audio analysis results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audio features produced by an `analyze` phase
///
/// `features` is opaque to the pipeline: it is stored as returned by the
/// analysis service and handed back to the critic for reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    pub id: Uuid,
    pub track_id: Uuid,
    pub job_id: Option<Uuid>,
    pub features: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
