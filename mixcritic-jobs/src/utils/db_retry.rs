//! Database Retry Logic
//!
//! Exponential backoff for transient SQLite lock errors. Writers from
//! independent jobs share one database file; under load a write may see
//! `database is locked` even with a busy timeout.

use std::time::{Duration, Instant};

use crate::error::JobError;

/// Errors that can tell whether they were caused by lock contention
pub trait LockContention {
    fn is_lock_contention(&self) -> bool;
}

impl LockContention for mixcritic_common::Error {
    fn is_lock_contention(&self) -> bool {
        mixcritic_common::Error::is_lock_contention(self)
    }
}

impl LockContention for JobError {
    fn is_lock_contention(&self) -> bool {
        match self {
            JobError::Common(err) => err.is_lock_contention(),
            _ => false,
        }
    }
}

/// Retry a database operation with exponential backoff until max_wait_ms elapses.
///
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If it failed on a lock: back off (10ms doubling, capped at 1000ms) and
///    retry while time remains, else give up
/// 4. Any other error is returned immediately
pub async fn retry_on_lock<F, Fut, T, E>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: LockContention + From<mixcritic_common::Error>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_lock_contention() {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(E::from(mixcritic_common::Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    ))));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}
