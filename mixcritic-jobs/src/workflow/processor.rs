//! Job processor
//!
//! Runs one claimed job to a terminal status: `queued → running →
//! {complete | error}`. Every failure, including a panic inside the job,
//! ends as a failed job row; nothing propagates out of [`JobProcessor::run`].

use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::progress::{self, Milestone, ProgressScale};
use super::transitions::{JobOutcome, Transitions};
use crate::db;
use crate::error::JobError;
use crate::models::{Job, JobType, ReviewDraft, Track};
use crate::services::critic::{
    validate_draft, validate_features, AlbumRequest, AlbumTrack, AudioRef, CompareRequest, Critic,
    CriticError, CritiqueRequest,
};

/// Why a job could not finish
#[derive(Debug, Error)]
enum ProcessError {
    #[error(transparent)]
    Critic(#[from] CriticError),

    /// Something the job needs is missing (analysis, parent track, ...)
    #[error("{0}")]
    Prerequisite(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl From<mixcritic_common::Error> for ProcessError {
    fn from(err: mixcritic_common::Error) -> Self {
        ProcessError::Job(JobError::Common(err))
    }
}

type ProcessResult<T> = Result<T, ProcessError>;

/// Executes jobs against the critique service
pub struct JobProcessor {
    transitions: Transitions,
    critic: Arc<dyn Critic>,
    call_timeout: Duration,
}

impl JobProcessor {
    pub fn new(transitions: Transitions, critic: Arc<dyn Critic>, call_timeout: Duration) -> Self {
        Self {
            transitions,
            critic,
            call_timeout,
        }
    }

    /// Claim and process a job
    pub async fn run(&self, job_id: Uuid) {
        let job = match self.transitions.claim(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!(job_id = %job_id, "Job not queued, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to claim job");
                return;
            }
        };

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Processing job");

        let result = AssertUnwindSafe(self.execute(&job)).catch_unwind().await;

        let reason = match result {
            Ok(Ok(())) => return,
            Ok(Err(ProcessError::Job(JobError::Conflict(msg)))) => {
                // The watchdog (or recovery) already finished this job.
                tracing::warn!(job_id = %job.id, reason = %msg, "Dropping result of superseded job");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "internal error: job processing panicked".to_string(),
        };

        if let Err(e) = self.transitions.fail(&job, &reason).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
        }
    }

    async fn execute(&self, job: &Job) -> ProcessResult<()> {
        match job.job_type {
            JobType::Analyze => {
                let track = self.load_track(job).await?;
                let features = self.analyze_phase(job, &track, ProgressScale::FULL).await?;
                self.transitions
                    .complete(job, JobOutcome::Analysis(features))
                    .await?;
            }
            JobType::Review => {
                let track = self.load_track(job).await?;
                let features = self.stored_features(&track).await?;
                let draft = self
                    .review_phase(job, &track, features, ProgressScale::FULL)
                    .await?;
                self.complete_review(job, draft, None).await?;
            }
            JobType::AnalyzeAndReview => {
                let track = self.load_track(job).await?;
                let features = if job.reuses_analysis() {
                    let features = self.stored_features(&track).await?;
                    self.milestone(job, ProgressScale::FULL, progress::ANALYSIS_REUSED)
                        .await;
                    features
                } else {
                    let features = self
                        .analyze_phase(job, &track, ProgressScale::FIRST_HALF)
                        .await?;
                    self.transitions
                        .checkpoint_analysis(job, &features, progress::CHECKPOINT_PERCENT)
                        .await?;
                    features
                };
                let draft = self
                    .review_phase(job, &track, features, ProgressScale::SECOND_HALF)
                    .await?;
                self.complete_review(job, draft, None).await?;
            }
            JobType::Compare => {
                let track = self.load_track(job).await?;
                let (draft, parent_id) = self.compare_phase(job, &track).await?;
                self.complete_review(job, draft, Some(parent_id)).await?;
            }
            JobType::AlbumReview => {
                let draft = self.album_phase(job).await?;
                self.complete_review(job, draft, None).await?;
            }
        }
        Ok(())
    }

    async fn analyze_phase(
        &self,
        job: &Job,
        track: &Track,
        scale: ProgressScale,
    ) -> ProcessResult<serde_json::Value> {
        self.milestone(job, scale, progress::ANALYZE_UPLOADING).await;
        let audio = AudioRef::from(track);

        self.milestone(job, scale, progress::ANALYZE_LISTENING).await;
        let features = self.call(self.critic.analyze(&audio)).await?;
        validate_features(&features)?;

        self.milestone(job, scale, progress::ANALYZE_SAVING).await;
        Ok(features)
    }

    async fn review_phase(
        &self,
        job: &Job,
        track: &Track,
        features: serde_json::Value,
        scale: ProgressScale,
    ) -> ProcessResult<ReviewDraft> {
        self.milestone(job, scale, progress::REVIEW_PREPARING).await;
        let request = CritiqueRequest {
            audio: AudioRef::from(track),
            features,
            options: job.options.clone(),
        };

        self.milestone(job, scale, progress::REVIEW_LISTENING).await;
        let draft = self.call(self.critic.critique(&request)).await?;
        validate_draft(&draft)?;

        self.milestone(job, scale, progress::REVIEW_WRITING).await;
        Ok(draft)
    }

    async fn compare_phase(&self, job: &Job, track: &Track) -> ProcessResult<(ReviewDraft, Uuid)> {
        let scale = ProgressScale::FULL;
        self.milestone(job, scale, progress::REVIEW_PREPARING).await;

        let parent_id = track.parent_track_id.ok_or_else(|| {
            ProcessError::Prerequisite("track has no previous version to compare with".to_string())
        })?;
        let parent = db::tracks::get_track(self.transitions.pool(), parent_id)
            .await?
            .ok_or_else(|| ProcessError::Prerequisite("previous version was deleted".to_string()))?;

        let current_features = self.stored_features(track).await?;
        let previous_features = db::analyses::latest_analysis(self.transitions.pool(), parent.id)
            .await?
            .map(|analysis| analysis.features)
            .ok_or_else(|| {
                ProcessError::Prerequisite("previous version has not been analyzed".to_string())
            })?;
        let previous_review = db::reviews::latest_track_review(self.transitions.pool(), parent.id)
            .await?
            .map(|review| review.review_markdown);

        let request = CompareRequest {
            current: AudioRef::from(track),
            current_features,
            previous: AudioRef::from(&parent),
            previous_features,
            previous_review,
            options: job.options.clone(),
        };

        self.milestone(job, scale, progress::REVIEW_LISTENING).await;
        let draft = self.call(self.critic.compare(&request)).await?;
        validate_draft(&draft)?;

        self.milestone(job, scale, progress::REVIEW_WRITING).await;
        Ok((draft, parent.id))
    }

    async fn album_phase(&self, job: &Job) -> ProcessResult<ReviewDraft> {
        let scale = ProgressScale::FULL;
        let pool = self.transitions.pool();
        self.milestone(job, scale, progress::REVIEW_PREPARING).await;

        let project = db::projects::get_project(pool, job.project_id)
            .await?
            .ok_or_else(|| ProcessError::Prerequisite("project was deleted".to_string()))?;

        let filenames: HashMap<Uuid, String> = db::tracks::list_project_tracks(pool, project.id)
            .await?
            .into_iter()
            .map(|track| (track.id, track.filename))
            .collect();

        let tracks: Vec<AlbumTrack> = db::reviews::latest_track_reviews_in_project(pool, project.id)
            .await?
            .iter()
            .filter_map(|review| {
                let filename = filenames.get(&review.track_id?)?;
                AlbumTrack::new(filename.as_str(), review)
            })
            .collect();

        if tracks.is_empty() {
            return Err(ProcessError::Prerequisite(
                "project has no reviewed tracks".to_string(),
            ));
        }

        let request = AlbumRequest {
            project_id: project.id,
            project_name: project.name,
            tracks,
            options: job.options.clone(),
        };

        self.milestone(job, scale, progress::REVIEW_LISTENING).await;
        let draft = self.call(self.critic.album(&request)).await?;
        validate_draft(&draft)?;

        self.milestone(job, scale, progress::REVIEW_WRITING).await;
        Ok(draft)
    }

    async fn complete_review(
        &self,
        job: &Job,
        draft: ReviewDraft,
        compared_track_id: Option<Uuid>,
    ) -> ProcessResult<()> {
        self.transitions
            .complete(
                job,
                JobOutcome::Review {
                    draft,
                    compared_track_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn load_track(&self, job: &Job) -> ProcessResult<Track> {
        let track_id = job.track_id.ok_or_else(|| {
            ProcessError::Prerequisite(format!("{} job has no track", job.job_type))
        })?;
        db::tracks::get_track(self.transitions.pool(), track_id)
            .await?
            .ok_or_else(|| ProcessError::Prerequisite("track was deleted".to_string()))
    }

    async fn stored_features(&self, track: &Track) -> ProcessResult<serde_json::Value> {
        db::analyses::latest_analysis(self.transitions.pool(), track.id)
            .await?
            .map(|analysis| analysis.features)
            .ok_or_else(|| ProcessError::Prerequisite("track has no stored analysis".to_string()))
    }

    /// Bound one external call by the configured timeout
    async fn call<T, F>(&self, fut: F) -> Result<T, CriticError>
    where
        F: Future<Output = Result<T, CriticError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CriticError::Timeout(self.call_timeout)),
        }
    }

    /// Progress is advisory: a failed write is logged, never fatal
    async fn milestone(&self, job: &Job, scale: ProgressScale, milestone: Milestone) {
        let percent = scale.apply(milestone.percent);
        if let Err(e) = self
            .transitions
            .report_progress(job, percent, milestone.message)
            .await
        {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record progress");
        }
    }
}
