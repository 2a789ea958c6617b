//! Reviews: immutable, versioned critiques

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Highest score a dimension may carry
pub const MAX_SCORE: f64 = 10.0;

/// Dimension name → score in `0.0..=10.0`
pub type Scores = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Track,
    Album,
    Comparison,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Track => "track",
            ReviewType::Album => "album",
            ReviewType::Comparison => "comparison",
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(ReviewType::Track),
            "album" => Ok(ReviewType::Album),
            "comparison" => Ok(ReviewType::Comparison),
            other => Err(format!("Unknown review type: {}", other)),
        }
    }
}

/// Stored review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub project_id: Uuid,
    /// `None` for album reviews
    pub track_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub review_type: ReviewType,
    /// The earlier version a comparison was made against
    pub compared_track_id: Option<Uuid>,
    pub scores: Scores,
    pub review_markdown: String,
    pub quick_take: String,
    /// 1, 2, 3, ... per (track, review type)
    pub review_version: i64,
    pub created_at: DateTime<Utc>,
}

/// Critique content as returned by the critic, before it is versioned and stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub scores: Scores,
    pub review_markdown: String,
    #[serde(default)]
    pub quick_take: String,
}

impl ReviewDraft {
    /// Check the critic returned something we can store
    pub fn validate(&self) -> Result<(), String> {
        if self.review_markdown.trim().is_empty() {
            return Err("critique text is empty".to_string());
        }
        if self.scores.is_empty() {
            return Err("critique has no scores".to_string());
        }
        for (dimension, score) in &self.scores {
            if dimension.trim().is_empty() {
                return Err("score with empty dimension name".to_string());
            }
            if !score.is_finite() || *score < 0.0 || *score > MAX_SCORE {
                return Err(format!(
                    "score for '{}' out of range 0-{}: {}",
                    dimension, MAX_SCORE, score
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(scores: &[(&str, f64)]) -> ReviewDraft {
        ReviewDraft {
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            review_markdown: "## Mix\nVocals sit well.".to_string(),
            quick_take: "Solid demo".to_string(),
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft(&[("mix", 7.5), ("arrangement", 10.0), ("vocals", 0.0)]).validate().is_ok());
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        assert!(draft(&[("mix", 11.0)]).validate().is_err());
        assert!(draft(&[("mix", -0.5)]).validate().is_err());
        assert!(draft(&[("mix", f64::INFINITY)]).validate().is_err());
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(draft(&[]).validate().is_err());

        let mut blank = draft(&[("mix", 5.0)]);
        blank.review_markdown = "   ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_quick_take_defaults_when_missing() {
        let parsed: ReviewDraft =
            serde_json::from_str(r#"{"scores":{"mix":6},"review_markdown":"ok"}"#).unwrap();
        assert_eq!(parsed.quick_take, "");
        assert_eq!(parsed.scores["mix"], 6.0);
    }
}
