//! Track and job status transitions
//!
//! Every write to `tracks.status`, `jobs.status` and `jobs.progress` goes
//! through [`Transitions`]. Each transition is one SQLite transaction that
//! opens with a write, so WAL never has to upgrade a read snapshot, and each
//! one announces itself on the event bus after commit.
//!
//! Enqueue decisions that need no database access live in [`plan_enqueue`]
//! and [`plan_retry`].

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use mixcritic_common::events::{EventBus, MixEvent};
use mixcritic_common::time;

use super::progress::{CHECKPOINT_PERCENT, DONE_MESSAGE, DONE_PERCENT};
use crate::db;
use crate::db::reviews::ReviewInsert;
use crate::error::{JobError, JobResult};
use crate::models::{
    Job, JobOptions, JobStatus, JobType, Review, ReviewDraft, TrackAnalysis, TrackStatus,
};
use crate::utils::retry_on_lock;

const QUEUED_MESSAGE: &str = "Queued";
const CHECKPOINT_MESSAGE: &str = "Analysis saved";

/// Track status change decided at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueuePlan {
    /// Status the caller observed; the enqueue fails if it changed meanwhile
    pub expected: TrackStatus,
    /// Status written in the enqueue transaction
    pub next: TrackStatus,
    /// Status a retry of this job restores
    pub resume: TrackStatus,
}

/// Decide whether `job_type` may start on a track in `observed` status
pub fn plan_enqueue(
    job_type: JobType,
    observed: TrackStatus,
    has_analysis: bool,
) -> JobResult<EnqueuePlan> {
    if observed.is_in_progress() {
        return Err(JobError::Conflict(format!(
            "track is {}; another job is active",
            observed
        )));
    }

    if !job_type.allowed_sources().contains(&observed) {
        return Err(JobError::Precondition(format!(
            "cannot start {} on a track in status {}",
            job_type, observed
        )));
    }

    if job_type == JobType::Review && observed == TrackStatus::Error && !has_analysis {
        return Err(JobError::Precondition(
            "track has no stored analysis; run analyze first".to_string(),
        ));
    }

    let next = job_type.in_progress_status().unwrap_or(observed);
    Ok(EnqueuePlan {
        expected: observed,
        next,
        resume: next,
    })
}

/// Decide how a retry of `failed` moves a track in `observed` status
///
/// A track still in `error` returns to the status the failed job was
/// attempting. A track that has moved on since (another job succeeded)
/// follows the normal enqueue rules.
pub fn plan_retry(failed: &Job, observed: TrackStatus, has_analysis: bool) -> JobResult<EnqueuePlan> {
    if observed != TrackStatus::Error {
        return plan_enqueue(failed.job_type, observed, has_analysis);
    }

    let resume = match failed.job_type {
        // Past the checkpoint the features are stored; only the review half reruns
        JobType::AnalyzeAndReview if failed.progress >= CHECKPOINT_PERCENT && has_analysis => {
            TrackStatus::Reviewing
        }
        JobType::AnalyzeAndReview => TrackStatus::Analyzing,
        _ => failed
            .resume_status
            .or_else(|| failed.job_type.in_progress_status())
            .ok_or_else(|| {
                JobError::Precondition(format!("job {} has no status to resume", failed.id))
            })?,
    };

    if !TrackStatus::Error.can_transition_to(resume) {
        return Err(JobError::Precondition(format!(
            "cannot resume a failed track into {}",
            resume
        )));
    }

    if matches!(failed.job_type, JobType::Review) && !has_analysis {
        return Err(JobError::Precondition(
            "track has no stored analysis; run analyze first".to_string(),
        ));
    }

    Ok(EnqueuePlan {
        expected: TrackStatus::Error,
        next: resume,
        resume,
    })
}

/// A job about to be enqueued
#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: Uuid,
    /// `None` for project-level jobs
    pub track: Option<(Uuid, EnqueuePlan)>,
    pub job_type: JobType,
    pub options: JobOptions,
    pub retried_from: Option<Uuid>,
}

/// Result a processor hands to [`Transitions::complete`]
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Features from an `analyze` job
    Analysis(serde_json::Value),
    /// Critique from a review-producing job
    Review {
        draft: ReviewDraft,
        compared_track_id: Option<Uuid>,
    },
}

/// Rows written by a successful completion
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub analysis: Option<TrackAnalysis>,
    pub review: Option<Review>,
}

/// Owner of all status writes
#[derive(Clone)]
pub struct Transitions {
    pool: SqlitePool,
    event_bus: EventBus,
    max_lock_wait_ms: u64,
}

impl Transitions {
    pub fn new(pool: SqlitePool, event_bus: EventBus, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            event_bus,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Create a queued job and move its track to the planned status
    ///
    /// Inserting the job first lets the partial unique index reject a second
    /// active job before anything else is written. The track update is
    /// conditional on the observed status; if it lost a race the whole
    /// transaction rolls back.
    pub async fn begin(&self, new_job: NewJob) -> JobResult<Job> {
        let job = Job {
            id: Uuid::new_v4(),
            project_id: new_job.project_id,
            track_id: new_job.track.map(|(track_id, _)| track_id),
            job_type: new_job.job_type,
            status: JobStatus::Queued,
            progress: 0,
            progress_message: QUEUED_MESSAGE.to_string(),
            error_message: None,
            options: new_job.options,
            resume_status: new_job.track.map(|(_, plan)| plan.resume),
            retried_from: new_job.retried_from,
            created_at: time::now(),
            started_at: None,
            finished_at: None,
        };

        retry_on_lock("begin_job", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            if let Err(err) = db::jobs::insert_job(&mut tx, &job).await {
                return Err(if is_unique_violation(&err) {
                    JobError::Conflict(match job.track_id {
                        Some(track_id) => format!("track {} already has an active job", track_id),
                        None => format!("project {} already has an active job", job.project_id),
                    })
                } else {
                    JobError::Common(err)
                });
            }

            if let Some((track_id, plan)) = new_job.track {
                let updated = sqlx::query(
                    r#"
                    UPDATE tracks
                    SET status = ?1,
                        updated_at = CASE WHEN status = ?1 THEN updated_at ELSE ?2 END
                    WHERE id = ?3 AND status = ?4
                    "#,
                )
                .bind(plan.next.as_str())
                .bind(time::to_db(job.created_at))
                .bind(track_id.to_string())
                .bind(plan.expected.as_str())
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(JobError::Conflict(format!(
                        "track {} status changed concurrently",
                        track_id
                    )));
                }
            }

            tx.commit().await?;
            Ok(())
        })
        .await?;

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            track_id = ?job.track_id,
            retried_from = ?job.retried_from,
            "Job queued"
        );

        self.event_bus.emit_lossy(MixEvent::JobQueued {
            job_id: job.id,
            project_id: job.project_id,
            track_id: job.track_id,
            job_type: job.job_type.as_str().to_string(),
            retried_from: job.retried_from,
            timestamp: job.created_at,
        });

        if let Some((track_id, plan)) = new_job.track {
            if plan.next != plan.expected {
                self.emit_track_change(track_id, job.project_id, plan.expected, plan.next);
            }
        }

        Ok(job)
    }

    /// Claim a queued job for processing (`queued → running`)
    ///
    /// Returns `None` when the job is no longer queued.
    pub async fn claim(&self, job_id: Uuid) -> JobResult<Option<Job>> {
        let started_at = time::now();
        let sql = format!(
            "UPDATE jobs SET status = 'running', progress = 0, progress_message = '', started_at = ? \
             WHERE id = ? AND status = 'queued' RETURNING {}",
            db::jobs::JOB_COLUMNS
        );

        let job = retry_on_lock("claim_job", self.max_lock_wait_ms, || async {
            let row = sqlx::query(&sql)
                .bind(time::to_db(started_at))
                .bind(job_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, JobError>(row.as_ref().map(db::jobs::job_from_row).transpose()?)
        })
        .await?;

        if let Some(job) = &job {
            tracing::debug!(job_id = %job.id, "Job claimed");
            self.event_bus.emit_lossy(MixEvent::JobStarted {
                job_id: job.id,
                project_id: job.project_id,
                timestamp: started_at,
            });
        }

        Ok(job)
    }

    /// Record a progress milestone
    ///
    /// Progress never moves backwards and only running jobs accept it.
    /// Returns `false` when nothing was written.
    pub async fn report_progress(&self, job: &Job, percent: u8, message: &str) -> JobResult<bool> {
        let percent = percent.min(DONE_PERCENT);

        let updated = retry_on_lock("report_progress", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                "UPDATE jobs SET progress = ?1, progress_message = ?2 \
                 WHERE id = ?3 AND status = 'running' AND progress <= ?1",
            )
            .bind(percent as i64)
            .bind(message)
            .bind(job.id.to_string())
            .execute(&self.pool)
            .await?;
            Ok::<_, JobError>(result.rows_affected() > 0)
        })
        .await?;

        if updated {
            self.event_bus.emit_lossy(MixEvent::JobProgress {
                job_id: job.id,
                project_id: job.project_id,
                progress: percent,
                message: message.to_string(),
                timestamp: time::now(),
            });
        }

        Ok(updated)
    }

    /// Store the analysis half of `analyze_and_review`
    ///
    /// The track passes through `analyzed` into `reviewing` in one commit,
    /// so a failure in the review half leaves the features behind.
    pub async fn checkpoint_analysis(
        &self,
        job: &Job,
        features: &serde_json::Value,
        progress: u8,
    ) -> JobResult<TrackAnalysis> {
        let track_id = require_track(job)?;

        let analysis = retry_on_lock("checkpoint_analysis", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            let still_running = sqlx::query(
                "UPDATE jobs SET progress = ?, progress_message = ? WHERE id = ? AND status = 'running'",
            )
            .bind(progress as i64)
            .bind(CHECKPOINT_MESSAGE)
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await?;

            if still_running.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(no_longer_running(job.id));
            }

            let analysis = db::analyses::insert_analysis(&mut tx, track_id, job.id, features).await?;

            sqlx::query(
                "UPDATE tracks SET status = 'reviewing', updated_at = ? WHERE id = ? AND status = 'analyzing'",
            )
            .bind(time::to_db(analysis.created_at))
            .bind(track_id.to_string())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(analysis)
        })
        .await?;

        tracing::info!(job_id = %job.id, track_id = %track_id, "Analysis checkpointed");

        self.emit_track_change(track_id, job.project_id, TrackStatus::Analyzing, TrackStatus::Analyzed);
        self.emit_track_change(track_id, job.project_id, TrackStatus::Analyzed, TrackStatus::Reviewing);
        self.event_bus.emit_lossy(MixEvent::JobProgress {
            job_id: job.id,
            project_id: job.project_id,
            progress,
            message: CHECKPOINT_MESSAGE.to_string(),
            timestamp: analysis.created_at,
        });

        Ok(analysis)
    }

    /// Finish a running job successfully
    ///
    /// Writes the job's result, marks the job complete at 100% and moves the
    /// track to the job's completed status, all in one commit.
    pub async fn complete(&self, job: &Job, outcome: JobOutcome) -> JobResult<Completion> {
        let finished_at = time::now();
        let next_status = job.completed_track_status();

        let (completion, old_status) = retry_on_lock("complete_job", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            let finished = sqlx::query(
                "UPDATE jobs SET status = 'complete', progress = ?, progress_message = ?, finished_at = ? \
                 WHERE id = ? AND status = 'running'",
            )
            .bind(DONE_PERCENT as i64)
            .bind(DONE_MESSAGE)
            .bind(time::to_db(finished_at))
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await?;

            if finished.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(no_longer_running(job.id));
            }

            let mut completion = Completion::default();
            match &outcome {
                JobOutcome::Analysis(features) => {
                    let track_id = require_track(job)?;
                    completion.analysis =
                        Some(db::analyses::insert_analysis(&mut tx, track_id, job.id, features).await?);
                }
                JobOutcome::Review {
                    draft,
                    compared_track_id,
                } => {
                    let review_type = job.job_type.review_type().ok_or_else(|| {
                        JobError::Precondition(format!("{} jobs do not produce reviews", job.job_type))
                    })?;
                    let review = db::reviews::insert_review(
                        &mut tx,
                        ReviewInsert {
                            project_id: job.project_id,
                            track_id: job.track_id,
                            job_id: job.id,
                            review_type,
                            compared_track_id: *compared_track_id,
                            draft,
                        },
                    )
                    .await?;
                    completion.review = Some(review);
                }
            }

            let old_status = match (job.track_id, next_status) {
                (Some(track_id), Some(next)) => write_track_status(&mut tx, track_id, next).await?,
                _ => None,
            };

            tx.commit().await?;
            Ok((completion, old_status))
        })
        .await?;

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            review_version = completion.review.as_ref().map(|r| r.review_version),
            "Job complete"
        );

        if let (Some(track_id), Some(old), Some(next)) = (job.track_id, old_status, next_status) {
            self.emit_track_change(track_id, job.project_id, old, next);
        }
        self.event_bus.emit_lossy(MixEvent::JobCompleted {
            job_id: job.id,
            project_id: job.project_id,
            review_id: completion.review.as_ref().map(|r| r.id),
            timestamp: finished_at,
        });

        Ok(completion)
    }

    /// Fail an active job and put its track in `error`
    ///
    /// Returns `false` when the job was already terminal (for example the
    /// watchdog got there first).
    pub async fn fail(&self, job: &Job, reason: &str) -> JobResult<bool> {
        let finished_at = time::now();

        let outcome = retry_on_lock("fail_job", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            let failed = sqlx::query(
                "UPDATE jobs SET status = 'error', error_message = ?, finished_at = ? \
                 WHERE id = ? AND status IN ('queued', 'running')",
            )
            .bind(reason)
            .bind(time::to_db(finished_at))
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await?;

            if failed.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(None);
            }

            let old_status = match job.track_id {
                Some(track_id) => write_track_status(&mut tx, track_id, TrackStatus::Error).await?,
                None => None,
            };

            tx.commit().await?;
            Ok::<_, JobError>(Some(old_status))
        })
        .await?;

        let Some(old_status) = outcome else {
            tracing::debug!(job_id = %job.id, "Job already terminal, not failing");
            return Ok(false);
        };

        tracing::warn!(job_id = %job.id, job_type = %job.job_type, reason, "Job failed");

        if let (Some(track_id), Some(old)) = (job.track_id, old_status) {
            self.emit_track_change(track_id, job.project_id, old, TrackStatus::Error);
        }
        self.event_bus.emit_lossy(MixEvent::JobFailed {
            job_id: job.id,
            project_id: job.project_id,
            error_message: reason.to_string(),
            timestamp: finished_at,
        });

        Ok(true)
    }

    /// Fail every job left `running` by a previous process
    pub async fn recover_interrupted(&self) -> JobResult<usize> {
        let running = db::jobs::list_jobs_by_status(&self.pool, JobStatus::Running).await?;
        let mut recovered = 0;
        for job in &running {
            if self.fail(job, "interrupted by service restart").await? {
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn emit_track_change(&self, track_id: Uuid, project_id: Uuid, old: TrackStatus, new: TrackStatus) {
        tracing::debug!(track_id = %track_id, old = %old, new = %new, "Track status changed");
        self.event_bus.emit_lossy(MixEvent::TrackStatusChanged {
            track_id,
            project_id,
            old_status: old.as_str().to_string(),
            new_status: new.as_str().to_string(),
            timestamp: time::now(),
        });
    }
}

/// Set a track's status inside a transaction
///
/// Returns the previous status when the row changed. A deleted track is
/// skipped.
async fn write_track_status(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    next: TrackStatus,
) -> JobResult<Option<TrackStatus>> {
    let current: Option<String> = sqlx::query_scalar("SELECT status FROM tracks WHERE id = ?")
        .bind(track_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(current) = current else {
        return Ok(None);
    };
    let current: TrackStatus = db::parse_enum("status", &current)?;

    if current == next {
        return Ok(None);
    }
    if !current.can_transition_to(next) {
        tracing::warn!(track_id = %track_id, from = %current, to = %next, "Unexpected track transition");
    }

    sqlx::query("UPDATE tracks SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next.as_str())
        .bind(time::to_db(time::now()))
        .bind(track_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(Some(current))
}

fn require_track(job: &Job) -> JobResult<Uuid> {
    job.track_id.ok_or_else(|| {
        JobError::Precondition(format!("{} job {} has no track", job.job_type, job.id))
    })
}

fn no_longer_running(job_id: Uuid) -> JobError {
    JobError::Conflict(format!("job {} is no longer running", job_id))
}

fn is_unique_violation(err: &mixcritic_common::Error) -> bool {
    match err {
        mixcritic_common::Error::Database(db_err) => db_err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false),
        _ => false,
    }
}
