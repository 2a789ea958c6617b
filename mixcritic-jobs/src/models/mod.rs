//! Data models for the job pipeline
//!
//! - Track status machine and job type table
//! - Job, review, analysis and project records

pub mod analysis;
pub mod batch;
pub mod job;
pub mod project;
pub mod review;
pub mod track;

pub use analysis::TrackAnalysis;
pub use batch::{BatchResult, SkippedTrack};
pub use job::{Job, JobOptions, JobScope, JobStatus, JobType};
pub use project::{NewProject, Project};
pub use review::{Review, ReviewDraft, ReviewType, Scores, MAX_SCORE};
pub use track::{NewTrack, Track, TrackStatus};
