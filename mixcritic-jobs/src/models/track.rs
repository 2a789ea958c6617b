//! Track entity and its status state machine
//!
//! ```text
//! uploaded → analyzing → analyzed → reviewing → reviewed
//!                                       ↑            │
//!                                       └────────────┘  (re-review)
//! any → error;  error → the status the failed job was attempting
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Track processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// Registered, nothing run yet
    Uploaded,
    /// Analysis job in flight
    Analyzing,
    /// Audio features stored
    Analyzed,
    /// Critique job in flight
    Reviewing,
    /// At least one track review stored
    Reviewed,
    /// Most recent job failed
    Error,
}

impl TrackStatus {
    pub const ALL: [TrackStatus; 6] = [
        TrackStatus::Uploaded,
        TrackStatus::Analyzing,
        TrackStatus::Analyzed,
        TrackStatus::Reviewing,
        TrackStatus::Reviewed,
        TrackStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Uploaded => "uploaded",
            TrackStatus::Analyzing => "analyzing",
            TrackStatus::Analyzed => "analyzed",
            TrackStatus::Reviewing => "reviewing",
            TrackStatus::Reviewed => "reviewed",
            TrackStatus::Error => "error",
        }
    }

    /// Whether a job is working on the track in this status
    pub fn is_in_progress(&self) -> bool {
        matches!(self, TrackStatus::Analyzing | TrackStatus::Reviewing)
    }

    /// Whether the status machine permits `self → next`
    ///
    /// Self-transitions are always allowed (no-op writes).
    pub fn can_transition_to(&self, next: TrackStatus) -> bool {
        use TrackStatus::*;

        if *self == next || next == Error {
            return true;
        }

        matches!(
            (*self, next),
            (Uploaded, Analyzing)
                | (Analyzing, Analyzed)
                | (Analyzed, Reviewing)
                | (Reviewing, Reviewed)
                | (Reviewed, Reviewing)
                | (Error, Analyzing)
                | (Error, Analyzed)
                | (Error, Reviewing)
                | (Error, Reviewed)
        )
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown track status: {}", s))
    }
}

/// Uploaded audio file and its derived status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub project_id: Uuid,
    pub filename: String,
    pub file_size: i64,
    /// Seconds, when the uploader could determine it
    pub duration: Option<f64>,
    pub mime_type: String,
    /// Durable storage reference handed to the critique service
    pub audio_url: String,
    pub status: TrackStatus,
    pub version_number: i64,
    pub parent_track_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for registering an uploaded track
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrack {
    pub filename: String,
    pub file_size: i64,
    #[serde(default)]
    pub duration: Option<f64>,
    pub mime_type: String,
    pub audio_url: String,
    /// Previous version of the same song, if this is a re-upload
    #[serde(default)]
    pub parent_track_id: Option<Uuid>,
}

impl NewTrack {
    /// Reject obviously unusable metadata before touching the database
    pub fn validate(&self) -> Result<(), String> {
        if self.filename.trim().is_empty() {
            return Err("filename must not be empty".to_string());
        }
        if self.file_size < 0 {
            return Err("file_size must not be negative".to_string());
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err("duration must be a non-negative number of seconds".to_string());
            }
        }
        if !self.mime_type.starts_with("audio/") {
            return Err(format!("unsupported mime type: {}", self.mime_type));
        }
        if self.audio_url.trim().is_empty() {
            return Err("audio_url must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TrackStatus::*;

    #[test]
    fn test_forward_path_is_allowed() {
        let path = [Uploaded, Analyzing, Analyzed, Reviewing, Reviewed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_backward_moves_are_rejected() {
        assert!(!Analyzed.can_transition_to(Analyzing));
        assert!(!Reviewed.can_transition_to(Analyzed));
        assert!(!Analyzing.can_transition_to(Uploaded));
        assert!(!Uploaded.can_transition_to(Reviewing));
        assert!(!Uploaded.can_transition_to(Analyzed));
    }

    #[test]
    fn test_any_state_may_fail() {
        for status in TrackStatus::ALL {
            assert!(status.can_transition_to(Error));
        }
    }

    #[test]
    fn test_error_returns_to_attempted_state() {
        assert!(Error.can_transition_to(Analyzing));
        assert!(Error.can_transition_to(Reviewing));
        assert!(!Error.can_transition_to(Uploaded));
    }

    #[test]
    fn test_re_review_is_allowed() {
        assert!(Reviewed.can_transition_to(Reviewing));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in TrackStatus::ALL {
            assert_eq!(status.as_str().parse::<TrackStatus>().unwrap(), status);
        }
        assert!("finished".parse::<TrackStatus>().is_err());
        assert_eq!(serde_json::to_string(&Reviewing).unwrap(), "\"reviewing\"");
    }

    #[test]
    fn test_new_track_validation() {
        let mut track = NewTrack {
            filename: "demo.wav".to_string(),
            file_size: 2048,
            duration: Some(183.5),
            mime_type: "audio/wav".to_string(),
            audio_url: "https://blobs.example.com/demo.wav".to_string(),
            parent_track_id: None,
        };
        assert!(track.validate().is_ok());

        track.mime_type = "video/mp4".to_string();
        assert!(track.validate().is_err());

        track.mime_type = "audio/mpeg".to_string();
        track.duration = Some(f64::NAN);
        assert!(track.validate().is_err());
    }
}
