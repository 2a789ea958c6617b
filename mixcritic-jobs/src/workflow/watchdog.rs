//! Stale job watchdog
//!
//! A job whose worker hangs (or whose external call never returns despite
//! the per-call timeout) would otherwise stay `running` forever and block
//! its track. The watchdog fails such jobs through the normal fail
//! transition, which frees the track for a retry.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mixcritic_common::{config::JobsConfig, time};

use super::transitions::Transitions;
use crate::db;
use crate::error::JobResult;

pub struct Watchdog {
    transitions: Transitions,
    interval: Duration,
    stale_after: Duration,
}

impl Watchdog {
    pub fn new(transitions: Transitions, interval: Duration, stale_after: Duration) -> Self {
        Self {
            transitions,
            interval,
            stale_after,
        }
    }

    pub fn from_config(transitions: Transitions, config: &JobsConfig) -> Self {
        Self::new(
            transitions,
            Duration::from_secs(config.watchdog_interval_secs.max(1)),
            Duration::from_secs(config.stale_after_secs),
        )
    }

    /// Fail every job running longer than `stale_after`
    pub async fn sweep(&self) -> JobResult<usize> {
        let cutoff = chrono::Duration::from_std(self.stale_after)
            .ok()
            .and_then(|age| time::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale = db::jobs::list_running_started_before(self.transitions.pool(), cutoff).await?;

        let reason = format!("timed out: no result after {} s", self.stale_after.as_secs());
        let mut failed = 0;
        for job in &stale {
            if self.transitions.fail(job, &reason).await? {
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Sweep every `interval` until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                stale_after_secs = self.stale_after.as_secs(),
                "Watchdog started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match self.sweep().await {
                        Ok(0) => {}
                        Ok(failed) => tracing::warn!(failed, "Watchdog failed stale jobs"),
                        Err(e) => tracing::error!(error = %e, "Watchdog sweep failed"),
                    },
                }
            }

            tracing::info!("Watchdog stopped");
        })
    }
}
