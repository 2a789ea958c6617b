//! HTTP client for the critique service
//!
//! `POST {base_url}/analyze | /critique | /compare | /album`, JSON in and
//! out, bearer authentication, client-side request spacing.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use mixcritic_common::config::CriticConfig;

use super::critic::{AlbumRequest, AudioRef, CompareRequest, Critic, CriticError, CritiqueRequest};
use crate::models::ReviewDraft;

const USER_AGENT: &str = concat!("mixcritic-jobs/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in a job's error message
const MAX_ERROR_BODY: usize = 500;

/// Minimum spacing between outgoing requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Critic rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    features: serde_json::Value,
}

/// Critique service client
pub struct HttpCritic {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpCritic {
    pub fn new(config: &CriticConfig, api_key: Option<String>) -> Result<Self, CriticError> {
        let timeout = config.call_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CriticError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(config.min_request_interval_ms)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, CriticError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.rate_limiter.wait().await;

        let url = self.endpoint(path);
        tracing::debug!(url = %url, "Calling critique service");

        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let mut error_text = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut error_text, MAX_ERROR_BODY);
            tracing::warn!(url = %url, status = status.as_u16(), "Critique service returned error");
            return Err(CriticError::Api(status.as_u16(), error_text));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| CriticError::Malformed(e.to_string()))
    }

    fn map_send_error(&self, err: reqwest::Error) -> CriticError {
        if err.is_timeout() {
            CriticError::Timeout(self.timeout)
        } else {
            CriticError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Critic for HttpCritic {
    async fn analyze(&self, audio: &AudioRef) -> Result<serde_json::Value, CriticError> {
        let response: AnalyzeResponse = self.post("analyze", audio).await?;
        tracing::info!(track_id = %audio.track_id, "Analysis received");
        Ok(response.features)
    }

    async fn critique(&self, request: &CritiqueRequest) -> Result<ReviewDraft, CriticError> {
        self.post("critique", request).await
    }

    async fn compare(&self, request: &CompareRequest) -> Result<ReviewDraft, CriticError> {
        self.post("compare", request).await
    }

    async fn album(&self, request: &AlbumRequest) -> Result<ReviewDraft, CriticError> {
        self.post("album", request).await
    }
}

fn truncate_on_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = CriticConfig {
            base_url: "https://critic.example.com/v1/".to_string(),
            ..Default::default()
        };
        let critic = HttpCritic::new(&config, None).unwrap();
        assert_eq!(critic.endpoint("analyze"), "https://critic.example.com/v1/analyze");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut text = "é".repeat(10);
        truncate_on_char_boundary(&mut text, 5);
        assert_eq!(text, "éé");

        let mut short = "ok".to_string();
        truncate_on_char_boundary(&mut short, 5);
        assert_eq!(short, "ok");
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(50);
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let config = CriticConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            min_request_interval_ms: 0,
            ..Default::default()
        };
        let critic = HttpCritic::new(&config, Some("key".to_string())).unwrap();
        let audio = AudioRef {
            track_id: uuid::Uuid::new_v4(),
            audio_url: "https://blobs.example.com/a.wav".to_string(),
            filename: "a.wav".to_string(),
            mime_type: "audio/wav".to_string(),
            duration: None,
        };
        let err = critic.analyze(&audio).await.unwrap_err();
        assert!(matches!(err, CriticError::Network(_) | CriticError::Timeout(_)));
    }
}
