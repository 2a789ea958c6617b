//! Job pipeline
//!
//! - `transitions`: the only writer of track/job status and progress
//! - `processor`: runs a claimed job against the critique service
//! - `service`: enqueue, batch, retry and dispatch
//! - `watchdog`: fails jobs stuck in `running`
//! - `polling`: the client polling contract
//! - `progress`: milestone table

pub mod polling;
pub mod processor;
pub mod progress;
pub mod service;
pub mod transitions;
pub mod watchdog;

pub use polling::{wait_until_settled, PollingPolicy};
pub use processor::JobProcessor;
pub use service::{JobService, JobServiceConfig, RecoveryReport};
pub use transitions::{plan_enqueue, plan_retry, EnqueuePlan, JobOutcome, NewJob, Transitions};
pub use watchdog::Watchdog;
