//! Video synthesis client.
//!
//! Video generation is a long-running provider job: submit returns a job id,
//! then the client polls until the job reports done or the poll budget runs
//! out. The engine only sees the terminal artifact reference.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GenAiError, GenAiResult};
use crate::ports::VideoSynthesizer;

const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_MAX_POLLS: u32 = 60;

/// HTTP client for the video synthesis provider.
pub struct HttpVideoSynthesizer {
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct VideoRequest<'a> {
    prompt: &'a str,
    aspect_ratio: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
    #[serde(default)]
    video_ref: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpVideoSynthesizer {
    /// Create a new client from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        let api_key = std::env::var("VIDEO_API_KEY")
            .map_err(|_| GenAiError::config("VIDEO_API_KEY not set"))?;
        let base_url = std::env::var("VIDEO_API_URL")
            .map_err(|_| GenAiError::config("VIDEO_API_URL not set"))?;

        let poll_interval_ms = std::env::var("VIDEO_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let max_polls = std::env::var("VIDEO_MAX_POLLS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_POLLS);

        Ok(Self::new(api_key, base_url)
            .with_polling(Duration::from_millis(poll_interval_ms), max_polls))
    }

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_polls: DEFAULT_MAX_POLLS,
            client: Client::new(),
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    async fn submit(&self, prompt: &str, aspect_ratio: &str) -> GenAiResult<String> {
        let url = format!("{}/v1/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&VideoRequest { prompt, aspect_ratio })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::Provider { status, body });
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::schema(format!("submit response did not parse: {}", e)))?;
        Ok(parsed.job_id)
    }

    async fn poll(&self, job_id: &str) -> GenAiResult<JobStatusResponse> {
        let url = format!("{}/v1/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::Provider { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| GenAiError::schema(format!("job status did not parse: {}", e)))
    }
}

#[async_trait]
impl VideoSynthesizer for HttpVideoSynthesizer {
    async fn synthesize(&self, prompt: &str, aspect_ratio: &str) -> GenAiResult<String> {
        let job_id = self.submit(prompt, aspect_ratio).await?;
        debug!(job_id = %job_id, "Video job submitted");

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let status = self.poll(&job_id).await?;
            match status.status.as_str() {
                "done" => {
                    return status.video_ref.filter(|r| !r.is_empty()).ok_or_else(|| {
                        GenAiError::schema("done job has no video_ref")
                    });
                }
                "failed" => {
                    let reason = status.error.unwrap_or_else(|| "unknown".to_string());
                    warn!(job_id = %job_id, "Video job failed: {}", reason);
                    return Err(GenAiError::Provider {
                        status: 200,
                        body: format!("video job failed: {}", reason),
                    });
                }
                _ => continue,
            }
        }

        Err(GenAiError::JobTimeout(format!(
            "video job {} did not finish within {} polls",
            job_id, self.max_polls
        )))
    }
}
