//! Job service: the enqueue API
//!
//! Validates a request, creates the job through [`Transitions::begin`] and
//! hands it to a worker. Workers share a semaphore, so at most
//! `max_concurrent` jobs run at once; the rest wait for a permit.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use mixcritic_common::config::TomlConfig;

use super::processor::JobProcessor;
use super::transitions::{plan_enqueue, plan_retry, NewJob, Transitions};
use crate::db;
use crate::db::tracks::DeleteOutcome;
use crate::error::{JobError, JobResult};
use crate::models::{BatchResult, Job, JobOptions, JobScope, JobStatus, JobType, Track, TrackStatus};
use crate::services::Critic;

/// Tuning for the service and its workers
#[derive(Debug, Clone, PartialEq)]
pub struct JobServiceConfig {
    pub max_concurrent: usize,
    /// Upper bound on one critique service call
    pub call_timeout: Duration,
}

impl JobServiceConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            max_concurrent: config.jobs.max_concurrent.max(1),
            call_timeout: config.critic.call_timeout(),
        }
    }
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default())
    }
}

/// What startup recovery did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs found `running` and failed
    pub interrupted: usize,
    /// Jobs found `queued` and dispatched again
    pub requeued: usize,
}

pub struct JobService {
    transitions: Transitions,
    processor: Arc<JobProcessor>,
    permits: Arc<Semaphore>,
}

impl JobService {
    pub fn new(transitions: Transitions, critic: Arc<dyn Critic>, config: JobServiceConfig) -> Self {
        let processor = JobProcessor::new(transitions.clone(), critic, config.call_timeout);
        Self {
            transitions,
            processor: Arc::new(processor),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    pub fn transitions(&self) -> &Transitions {
        &self.transitions
    }

    /// Queue a track-level job
    ///
    /// Returns as soon as the job row is committed; processing happens on
    /// a worker.
    pub async fn enqueue(&self, track_id: Uuid, job_type: JobType, options: JobOptions) -> JobResult<Job> {
        if job_type.scope() != JobScope::Track {
            return Err(JobError::Precondition(format!(
                "{} is a project-level job",
                job_type
            )));
        }

        let track = self.load_track(track_id).await?;
        let has_analysis = db::analyses::has_analysis(self.pool(), track.id).await?;
        let plan = plan_enqueue(job_type, track.status, has_analysis)?;

        if job_type == JobType::Compare {
            self.check_compare_ready(&track).await?;
        }

        let job = self
            .transitions
            .begin(NewJob {
                project_id: track.project_id,
                track: Some((track.id, plan)),
                job_type,
                options,
                retried_from: None,
            })
            .await?;

        self.dispatch(job.id);
        Ok(job)
    }

    /// Queue a project-level job (`album_review`)
    pub async fn enqueue_project(
        &self,
        project_id: Uuid,
        job_type: JobType,
        options: JobOptions,
    ) -> JobResult<Job> {
        if job_type.scope() != JobScope::Project {
            return Err(JobError::Precondition(format!(
                "{} needs a track",
                job_type
            )));
        }

        self.check_album_ready(project_id).await?;

        let job = self
            .transitions
            .begin(NewJob {
                project_id,
                track: None,
                job_type,
                options,
                retried_from: None,
            })
            .await?;

        self.dispatch(job.id);
        Ok(job)
    }

    /// Queue the next step for every track of a project
    ///
    /// `analyzed` tracks get a `review`, `uploaded` tracks an
    /// `analyze_and_review`. Everything else is skipped with a reason, as
    /// is any track whose enqueue is refused. Only infrastructure errors
    /// abort the batch.
    pub async fn batch_review_all(&self, project_id: Uuid, options: JobOptions) -> JobResult<BatchResult> {
        self.load_project(project_id).await?;
        let tracks = db::tracks::list_project_tracks(self.pool(), project_id).await?;

        let mut result = BatchResult::default();
        for track in tracks {
            let job_type = match track.status {
                TrackStatus::Analyzed => JobType::Review,
                TrackStatus::Uploaded => JobType::AnalyzeAndReview,
                TrackStatus::Reviewed => {
                    result.record_skipped(track.id, "already reviewed");
                    continue;
                }
                TrackStatus::Error => {
                    result.record_skipped(track.id, "last job failed; retry it instead");
                    continue;
                }
                TrackStatus::Analyzing | TrackStatus::Reviewing => {
                    result.record_skipped(track.id, "a job is already in progress");
                    continue;
                }
            };

            match self.enqueue(track.id, job_type, options.clone()).await {
                Ok(job) => result.record_queued(job.id),
                Err(JobError::Common(e)) => return Err(JobError::Common(e)),
                Err(e) => result.record_skipped(track.id, e.to_string()),
            }
        }

        tracing::info!(
            project_id = %project_id,
            queued = result.queued,
            skipped = result.skipped,
            "Batch review queued"
        );

        Ok(result)
    }

    /// Queue a new attempt of a failed job
    ///
    /// The failed job keeps its row; the new one points back at it through
    /// `retried_from`.
    pub async fn retry(&self, job_id: Uuid) -> JobResult<Job> {
        let failed = self.get_job(job_id).await?;
        if failed.status != JobStatus::Error {
            return Err(JobError::Precondition(format!(
                "job {} is {}; only failed jobs can be retried",
                job_id, failed.status
            )));
        }

        let track = match failed.track_id {
            Some(track_id) => {
                let track = self.load_track(track_id).await?;
                let has_analysis = db::analyses::has_analysis(self.pool(), track.id).await?;
                let plan = plan_retry(&failed, track.status, has_analysis)?;
                if failed.job_type == JobType::Compare {
                    self.check_compare_ready(&track).await?;
                }
                Some((track.id, plan))
            }
            None => {
                self.check_album_ready(failed.project_id).await?;
                None
            }
        };

        let job = self
            .transitions
            .begin(NewJob {
                project_id: failed.project_id,
                track,
                job_type: failed.job_type,
                options: failed.options.clone(),
                retried_from: Some(failed.id),
            })
            .await?;

        self.dispatch(job.id);
        Ok(job)
    }

    /// Jobs of a project, newest first
    pub async fn get_jobs(&self, project_id: Uuid) -> JobResult<Vec<Job>> {
        self.load_project(project_id).await?;
        Ok(db::jobs::list_project_jobs(self.pool(), project_id).await?)
    }

    /// Job history of a track, oldest first
    pub async fn get_track_jobs(&self, track_id: Uuid) -> JobResult<Vec<Job>> {
        self.load_track(track_id).await?;
        Ok(db::jobs::list_track_jobs(self.pool(), track_id).await?)
    }

    pub async fn get_job(&self, job_id: Uuid) -> JobResult<Job> {
        db::jobs::get_job(self.pool(), job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("job {}", job_id)))
    }

    /// Delete a track and its history, unless a job is active for it
    pub async fn delete_track(&self, track_id: Uuid) -> JobResult<()> {
        match db::tracks::delete_idle_track(self.pool(), track_id).await? {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::NotFound => Err(JobError::NotFound(format!("track {}", track_id))),
            DeleteOutcome::Busy => Err(JobError::Conflict(format!(
                "track {} has an active job",
                track_id
            ))),
        }
    }

    /// Hand a queued job to a worker
    pub fn dispatch(&self, job_id: Uuid) {
        let processor = Arc::clone(&self.processor);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(job_id = %job_id, "Worker pool closed; job left queued");
                    return;
                }
            };
            processor.run(job_id).await;
        });
    }

    /// Reconcile jobs left behind by a previous process
    ///
    /// `running` jobs lost their worker and are failed (and can be retried);
    /// `queued` jobs never started and are dispatched again.
    pub async fn recover_on_startup(&self) -> JobResult<RecoveryReport> {
        let interrupted = self.transitions.recover_interrupted().await?;

        let queued = db::jobs::list_jobs_by_status(self.pool(), JobStatus::Queued).await?;
        for job in &queued {
            self.dispatch(job.id);
        }

        let report = RecoveryReport {
            interrupted,
            requeued: queued.len(),
        };
        if report != RecoveryReport::default() {
            tracing::info!(
                interrupted = report.interrupted,
                requeued = report.requeued,
                "Recovered jobs from previous run"
            );
        }
        Ok(report)
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.transitions.pool()
    }

    async fn load_track(&self, track_id: Uuid) -> JobResult<Track> {
        db::tracks::get_track(self.pool(), track_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("track {}", track_id)))
    }

    async fn load_project(&self, project_id: Uuid) -> JobResult<()> {
        db::projects::get_project(self.pool(), project_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| JobError::NotFound(format!("project {}", project_id)))
    }

    async fn check_compare_ready(&self, track: &Track) -> JobResult<()> {
        let parent_id = track.parent_track_id.ok_or_else(|| {
            JobError::Precondition("track has no previous version to compare with".to_string())
        })?;
        if !db::analyses::has_analysis(self.pool(), track.id).await? {
            return Err(JobError::Precondition("track has not been analyzed".to_string()));
        }
        if !db::analyses::has_analysis(self.pool(), parent_id).await? {
            return Err(JobError::Precondition(
                "previous version has not been analyzed".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_album_ready(&self, project_id: Uuid) -> JobResult<()> {
        self.load_project(project_id).await?;
        if db::reviews::count_reviewed_tracks(self.pool(), project_id).await? == 0 {
            return Err(JobError::Precondition(
                "project has no reviewed tracks".to_string(),
            ));
        }
        Ok(())
    }
}
