//! Job records: one row per asynchronous analysis/critique operation
//!
//! Job lifecycle: `queued → running → {complete | error}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::review::ReviewType;
use super::track::TrackStatus;

/// Kind of work a job performs
///
/// Matched exhaustively by the processor; adding a variant forces every
/// dispatch site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Extract audio features
    Analyze,
    /// Write a critique from stored features
    Review,
    /// Analyze, then review, on one job row
    AnalyzeAndReview,
    /// Critique a track against its previous version
    Compare,
    /// Project-level critique across reviewed tracks
    AlbumReview,
}

/// What a job is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobScope {
    Track,
    Project,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Analyze,
        JobType::Review,
        JobType::AnalyzeAndReview,
        JobType::Compare,
        JobType::AlbumReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Analyze => "analyze",
            JobType::Review => "review",
            JobType::AnalyzeAndReview => "analyze_and_review",
            JobType::Compare => "compare",
            JobType::AlbumReview => "album_review",
        }
    }

    pub fn scope(&self) -> JobScope {
        match self {
            JobType::AlbumReview => JobScope::Project,
            JobType::Analyze | JobType::Review | JobType::AnalyzeAndReview | JobType::Compare => {
                JobScope::Track
            }
        }
    }

    /// Track statuses from which a fresh (non-retry) enqueue is allowed
    pub fn allowed_sources(&self) -> &'static [TrackStatus] {
        match self {
            JobType::Analyze | JobType::AnalyzeAndReview => {
                &[TrackStatus::Uploaded, TrackStatus::Error]
            }
            JobType::Review => &[TrackStatus::Analyzed, TrackStatus::Reviewed, TrackStatus::Error],
            JobType::Compare => &[TrackStatus::Analyzed, TrackStatus::Reviewed],
            JobType::AlbumReview => &[],
        }
    }

    /// Status the track shows while the job is active
    ///
    /// `None`: the job leaves the track status as it found it.
    pub fn in_progress_status(&self) -> Option<TrackStatus> {
        match self {
            JobType::Analyze | JobType::AnalyzeAndReview => Some(TrackStatus::Analyzing),
            JobType::Review => Some(TrackStatus::Reviewing),
            JobType::Compare | JobType::AlbumReview => None,
        }
    }

    /// Status the track reaches when the job completes
    ///
    /// `None`: the track returns to the job's resume status.
    pub fn completed_status(&self) -> Option<TrackStatus> {
        match self {
            JobType::Analyze => Some(TrackStatus::Analyzed),
            JobType::Review | JobType::AnalyzeAndReview => Some(TrackStatus::Reviewed),
            JobType::Compare | JobType::AlbumReview => None,
        }
    }

    /// Review row written on completion, if any
    pub fn review_type(&self) -> Option<ReviewType> {
        match self {
            JobType::Analyze => None,
            JobType::Review | JobType::AnalyzeAndReview => Some(ReviewType::Track),
            JobType::Compare => Some(ReviewType::Comparison),
            JobType::AlbumReview => Some(ReviewType::Album),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .find(|job_type| job_type.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown job type: {}", s))
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    /// Queued or running
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Caller-supplied knobs passed through to the critique service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Free-text guidance ("focus on the low end")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Critic persona to write as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Dimensions to emphasise (e.g. "mix", "arrangement")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus: Vec<String>,
}

/// Persisted job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub project_id: Uuid,
    /// `None` for project-level jobs
    pub track_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    /// 0-100, advisory
    pub progress: u8,
    pub progress_message: String,
    /// Failure reason when `status == error`
    pub error_message: Option<String>,
    pub options: JobOptions,
    /// Track status this job was attempting; restored when it is retried
    pub resume_status: Option<TrackStatus>,
    pub retried_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// A retried `analyze_and_review` that skips straight to the review half
    pub fn reuses_analysis(&self) -> bool {
        self.job_type == JobType::AnalyzeAndReview && self.resume_status == Some(TrackStatus::Reviewing)
    }

    /// Track status to set on success
    pub fn completed_track_status(&self) -> Option<TrackStatus> {
        self.job_type.completed_status().or(self.resume_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_strings() {
        for job_type in JobType::ALL {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
        }
        assert_eq!(
            serde_json::to_string(&JobType::AnalyzeAndReview).unwrap(),
            "\"analyze_and_review\""
        );
        assert!("transcode".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_status_activity() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
    }

    #[test]
    fn test_in_progress_statuses_are_reachable_from_sources() {
        for job_type in JobType::ALL {
            if let Some(in_progress) = job_type.in_progress_status() {
                for source in job_type.allowed_sources() {
                    assert!(
                        source.can_transition_to(in_progress),
                        "{}: {} -> {}",
                        job_type,
                        source,
                        in_progress
                    );
                }
            }
        }
    }

    #[test]
    fn test_review_cannot_start_from_uploaded() {
        assert!(!JobType::Review.allowed_sources().contains(&TrackStatus::Uploaded));
        assert!(JobType::AnalyzeAndReview.allowed_sources().contains(&TrackStatus::Uploaded));
    }

    #[test]
    fn test_project_scope() {
        assert_eq!(JobType::AlbumReview.scope(), JobScope::Project);
        assert_eq!(JobType::Compare.scope(), JobScope::Track);
        assert!(JobType::AlbumReview.allowed_sources().is_empty());
    }

    #[test]
    fn test_options_default_serialization_is_compact() {
        let json = serde_json::to_string(&JobOptions::default()).unwrap();
        assert_eq!(json, "{}");

        let parsed: JobOptions = serde_json::from_str(r#"{"persona":"producer"}"#).unwrap();
        assert_eq!(parsed.persona.as_deref(), Some("producer"));
        assert!(parsed.focus.is_empty());
    }
}
