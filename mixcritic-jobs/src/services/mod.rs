//! External services consumed by the job pipeline
//!
//! - `critic`: the `Critic` seam and its request/response types
//! - `critic_client`: HTTP implementation against the critique service

pub mod critic;
pub mod critic_client;

pub use critic::{
    validate_draft, validate_features, AlbumRequest, AlbumTrack, AudioRef, CompareRequest, Critic,
    CriticError, CritiqueRequest,
};
pub use critic_client::HttpCritic;
