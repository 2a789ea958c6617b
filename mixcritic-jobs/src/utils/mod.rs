//! Utility modules for mixcritic-jobs

pub mod db_retry;

pub use db_retry::{retry_on_lock, LockContention};
