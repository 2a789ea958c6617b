//! Polling client contract
//!
//! Clients re-fetch a project's jobs at a fixed interval while any job is
//! queued or running, and stop once none are.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{JobError, JobResult};
use crate::models::Job;

/// Interval advertised while jobs are active
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    interval: Duration,
}

impl PollingPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When to poll again, or `None` once every job is terminal
    pub fn next_poll(&self, jobs: &[Job]) -> Option<Duration> {
        jobs.iter().any(Job::is_active).then_some(self.interval)
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Poll `fetch` until no job is active, giving up after `deadline`
///
/// Returns the final (settled) job list.
pub async fn wait_until_settled<F, Fut>(
    policy: &PollingPolicy,
    deadline: Duration,
    mut fetch: F,
) -> JobResult<Vec<Job>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = JobResult<Vec<Job>>>,
{
    let started = Instant::now();

    loop {
        let jobs = fetch().await?;
        let Some(wait) = policy.next_poll(&jobs) else {
            return Ok(jobs);
        };

        if started.elapsed() + wait > deadline {
            let active = jobs.iter().filter(|job| job.is_active()).count();
            return Err(JobError::Common(mixcritic_common::Error::Internal(format!(
                "{} job(s) still active after {:?}",
                active, deadline
            ))));
        }

        tokio::time::sleep(wait).await;
    }
}
