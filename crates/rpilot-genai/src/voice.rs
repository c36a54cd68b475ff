//! Voice synthesis client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{GenAiError, GenAiResult};
use crate::ports::VoiceSynthesizer;

/// HTTP client for the voice synthesis provider.
///
/// The provider stores the rendered audio itself and returns a reference;
/// audio bytes never pass through the engine.
pub struct HttpVoiceSynthesizer {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct VoiceRequest<'a> {
    voice_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct VoiceResponse {
    audio_ref: String,
}

impl HttpVoiceSynthesizer {
    /// Create a new client from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        let api_key = std::env::var("VOICE_API_KEY")
            .map_err(|_| GenAiError::config("VOICE_API_KEY not set"))?;
        let base_url = std::env::var("VOICE_API_URL")
            .map_err(|_| GenAiError::config("VOICE_API_URL not set"))?;
        Ok(Self::new(api_key, base_url))
    }

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl VoiceSynthesizer for HttpVoiceSynthesizer {
    async fn synthesize(&self, voice_id: &str, text: &str) -> GenAiResult<String> {
        debug!(voice_id = %voice_id, chars = text.len(), "Synthesizing narration");

        let url = format!("{}/v1/synthesize", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&VoiceRequest { voice_id, text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::Provider { status, body });
        }

        let parsed: VoiceResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::schema(format!("voice response did not parse: {}", e)))?;

        if parsed.audio_ref.is_empty() {
            return Err(GenAiError::schema("voice response has empty audio_ref"));
        }

        Ok(parsed.audio_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_synthesize_returns_ref() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/synthesize"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"audio_ref": "audio/abc.mp3"})),
            )
            .mount(&server)
            .await;

        let client = HttpVoiceSynthesizer::new("key", server.uri());
        let audio_ref = client.synthesize("v1", "hello").await.unwrap();
        assert_eq!(audio_ref, "audio/abc.mp3");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = HttpVoiceSynthesizer::new("key", server.uri());
        let err = client.synthesize("v1", "hello").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
