//! Shared fixtures for mixcritic-jobs integration tests
//!
//! `ScriptedCritic` stands in for the critique service: it can fail or
//! panic on the next N calls, return out-of-range scores, or hold every
//! call behind a gate so a job stays `running` until the test opens it.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use uuid::Uuid;

use mixcritic_common::db::init_database;
use mixcritic_common::events::EventBus;
use mixcritic_jobs::db;
use mixcritic_jobs::models::{Job, JobStatus, NewTrack, Project, ReviewDraft, Track};
use mixcritic_jobs::services::{
    AlbumRequest, AudioRef, CompareRequest, Critic, CriticError, CritiqueRequest,
};
use mixcritic_jobs::workflow::{
    wait_until_settled, JobService, JobServiceConfig, PollingPolicy, Transitions,
};

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ScriptedCritic {
    gate: watch::Sender<bool>,
    analyze_failures: AtomicU32,
    critique_failures: AtomicU32,
    analyze_panics: AtomicU32,
    bad_scores: AtomicBool,
    pub analyze_calls: AtomicU32,
    pub critique_calls: AtomicU32,
    pub compare_calls: AtomicU32,
    pub album_calls: AtomicU32,
}

impl ScriptedCritic {
    /// Answers immediately
    pub fn new() -> Self {
        Self::with_gate(true)
    }

    /// Holds every call until `open_gate`
    pub fn gated() -> Self {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Self {
        let (gate, _) = watch::channel(open);
        Self {
            gate,
            analyze_failures: AtomicU32::new(0),
            critique_failures: AtomicU32::new(0),
            analyze_panics: AtomicU32::new(0),
            bad_scores: AtomicBool::new(false),
            analyze_calls: AtomicU32::new(0),
            critique_calls: AtomicU32::new(0),
            compare_calls: AtomicU32::new(0),
            album_calls: AtomicU32::new(0),
        }
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Hold calls made from now on
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn fail_next_analyses(&self, count: u32) {
        self.analyze_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_critiques(&self, count: u32) {
        self.critique_failures.store(count, Ordering::SeqCst);
    }

    pub fn panic_next_analyses(&self, count: u32) {
        self.analyze_panics.store(count, Ordering::SeqCst);
    }

    pub fn return_bad_scores(&self, enabled: bool) {
        self.bad_scores.store(enabled, Ordering::SeqCst);
    }

    async fn pass_gate(&self) {
        let mut rx = self.gate.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn draft(&self, text: &str) -> ReviewDraft {
        let mix = if self.bad_scores.load(Ordering::SeqCst) { 14.0 } else { 7.5 };
        ReviewDraft {
            scores: [("mix".to_string(), mix), ("arrangement".to_string(), 8.0)]
                .into_iter()
                .collect(),
            review_markdown: format!("## Critique\n{}", text),
            quick_take: "Promising".to_string(),
        }
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn analyze(&self, audio: &AudioRef) -> Result<serde_json::Value, CriticError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if Self::take_failure(&self.analyze_panics) {
            panic!("scripted analysis panic");
        }
        if Self::take_failure(&self.analyze_failures) {
            return Err(CriticError::Api(503, "analysis backend unavailable".to_string()));
        }
        Ok(json!({
            "tempo": 122,
            "key": "A minor",
            "loudness_lufs": -9.5,
            "source": audio.filename,
        }))
    }

    async fn critique(&self, request: &CritiqueRequest) -> Result<ReviewDraft, CriticError> {
        self.critique_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if Self::take_failure(&self.critique_failures) {
            return Err(CriticError::Network("connection reset".to_string()));
        }
        Ok(self.draft(&format!("Track {}", request.audio.filename)))
    }

    async fn compare(&self, request: &CompareRequest) -> Result<ReviewDraft, CriticError> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        Ok(self.draft(&format!(
            "{} vs {}",
            request.current.filename, request.previous.filename
        )))
    }

    async fn album(&self, request: &AlbumRequest) -> Result<ReviewDraft, CriticError> {
        self.album_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        Ok(self.draft(&format!("{} tracks", request.tracks.len())))
    }
}

pub struct TestEnv {
    _temp_dir: TempDir,
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub transitions: Transitions,
    pub jobs: Arc<JobService>,
    pub critic: Arc<ScriptedCritic>,
}

pub async fn setup() -> TestEnv {
    setup_with(ScriptedCritic::new(), JobServiceConfig::default()).await
}

pub async fn setup_gated() -> TestEnv {
    setup_with(ScriptedCritic::gated(), JobServiceConfig::default()).await
}

pub async fn setup_with(critic: ScriptedCritic, config: JobServiceConfig) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("mixcritic.db"))
        .await
        .expect("init_database failed");
    let event_bus = EventBus::new(1024);
    let transitions = Transitions::new(pool.clone(), event_bus.clone(), 5000);
    let critic = Arc::new(critic);
    let jobs = Arc::new(JobService::new(
        transitions.clone(),
        critic.clone() as Arc<dyn Critic>,
        config,
    ));

    TestEnv {
        _temp_dir: temp_dir,
        pool,
        event_bus,
        transitions,
        jobs,
        critic,
    }
}

impl TestEnv {
    pub async fn project(&self, name: &str) -> Project {
        db::projects::insert_project(&self.pool, name).await.unwrap()
    }

    pub async fn track(&self, project_id: Uuid, filename: &str) -> Track {
        db::tracks::insert_track(&self.pool, project_id, &new_track(filename, None))
            .await
            .unwrap()
    }

    pub async fn track_version(&self, project_id: Uuid, filename: &str, parent: &Track) -> Track {
        db::tracks::insert_track(&self.pool, project_id, &new_track(filename, Some(parent.id)))
            .await
            .unwrap()
    }

    pub async fn reload_track(&self, track_id: Uuid) -> Track {
        db::tracks::get_track(&self.pool, track_id)
            .await
            .unwrap()
            .expect("track exists")
    }

    /// Poll a job until it is terminal
    pub async fn wait_for_job(&self, job_id: Uuid) -> Job {
        let policy = PollingPolicy::new(Duration::from_millis(10));
        let jobs = wait_until_settled(&policy, SETTLE_TIMEOUT, || async {
            Ok(vec![self.jobs.get_job(job_id).await?])
        })
        .await
        .expect("job did not settle");
        jobs.into_iter().next().expect("one job")
    }

    /// Poll a project's jobs until none is active
    pub async fn wait_for_project(&self, project_id: Uuid) -> Vec<Job> {
        let policy = PollingPolicy::new(Duration::from_millis(10));
        wait_until_settled(&policy, SETTLE_TIMEOUT, || self.jobs.get_jobs(project_id))
            .await
            .expect("project jobs did not settle")
    }

    /// Poll until the job has been claimed by a worker
    pub async fn wait_until_running(&self, job_id: Uuid) -> Job {
        for _ in 0..500 {
            let job = self.jobs.get_job(job_id).await.unwrap();
            if job.status != JobStatus::Queued {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} was never claimed", job_id);
    }
}

pub fn new_track(filename: &str, parent_track_id: Option<Uuid>) -> NewTrack {
    NewTrack {
        filename: filename.to_string(),
        file_size: 4_200_000,
        duration: Some(211.4),
        mime_type: "audio/wav".to_string(),
        audio_url: format!("https://blobs.example.com/{}", filename),
        parent_track_id,
    }
}
