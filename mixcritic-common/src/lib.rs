//! # mixcritic common library
//!
//! Shared code for the mixcritic services:
//! - Error and result types
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Database initialization and schema
//! - Event types (`MixEvent`) and the broadcast `EventBus`
//! - Timestamp helpers for database storage

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
