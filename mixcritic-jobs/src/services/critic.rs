//! Critique/analysis service interface
//!
//! The processor talks to the outside world only through [`Critic`]. The
//! HTTP client implements it for production; tests substitute a scripted
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{JobOptions, Review, ReviewDraft, Scores, Track};

/// Critique service errors
///
/// Caught by the processor and stored on the job as `error_message`.
#[derive(Debug, Error)]
pub enum CriticError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("Critique service error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Audio handed to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
    pub track_id: Uuid,
    pub audio_url: String,
    pub filename: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl From<&Track> for AudioRef {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id,
            audio_url: track.audio_url.clone(),
            filename: track.filename.clone(),
            mime_type: track.mime_type.clone(),
            duration: track.duration,
        }
    }
}

/// Single-track critique input
#[derive(Debug, Clone, Serialize)]
pub struct CritiqueRequest {
    pub audio: AudioRef,
    pub features: serde_json::Value,
    pub options: JobOptions,
}

/// Critique of a track against its previous version
#[derive(Debug, Clone, Serialize)]
pub struct CompareRequest {
    pub current: AudioRef,
    pub current_features: serde_json::Value,
    pub previous: AudioRef,
    pub previous_features: serde_json::Value,
    /// Latest critique of the previous version, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_review: Option<String>,
    pub options: JobOptions,
}

/// One reviewed track as seen by an album critique
#[derive(Debug, Clone, Serialize)]
pub struct AlbumTrack {
    pub track_id: Uuid,
    pub filename: String,
    pub scores: Scores,
    pub quick_take: String,
    pub review_markdown: String,
}

impl AlbumTrack {
    pub fn new(filename: impl Into<String>, review: &Review) -> Option<Self> {
        Some(Self {
            track_id: review.track_id?,
            filename: filename.into(),
            scores: review.scores.clone(),
            quick_take: review.quick_take.clone(),
            review_markdown: review.review_markdown.clone(),
        })
    }
}

/// Project-level critique input
#[derive(Debug, Clone, Serialize)]
pub struct AlbumRequest {
    pub project_id: Uuid,
    pub project_name: String,
    pub tracks: Vec<AlbumTrack>,
    pub options: JobOptions,
}

/// External critique/analysis service
#[async_trait]
pub trait Critic: Send + Sync {
    /// Extract audio features; the result must be a JSON object
    async fn analyze(&self, audio: &AudioRef) -> Result<serde_json::Value, CriticError>;

    /// Write a critique of one track from its features
    async fn critique(&self, request: &CritiqueRequest) -> Result<ReviewDraft, CriticError>;

    /// Write a critique comparing a track with its previous version
    async fn compare(&self, request: &CompareRequest) -> Result<ReviewDraft, CriticError>;

    /// Write a critique of a project's reviewed tracks as a whole
    async fn album(&self, request: &AlbumRequest) -> Result<ReviewDraft, CriticError>;
}

/// Reject features the pipeline cannot store or hand back to the critic
pub fn validate_features(features: &serde_json::Value) -> Result<(), CriticError> {
    if features.is_object() {
        Ok(())
    } else {
        Err(CriticError::Malformed(format!(
            "analysis features must be a JSON object, got {}",
            json_kind(features)
        )))
    }
}

/// Reject critiques with empty text or scores outside 0-10
pub fn validate_draft(draft: &ReviewDraft) -> Result<(), CriticError> {
    draft.validate().map_err(CriticError::Malformed)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
