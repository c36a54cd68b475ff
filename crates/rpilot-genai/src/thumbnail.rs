//! Thumbnail synthesis client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{GenAiError, GenAiResult};
use crate::ports::ThumbnailSynthesizer;

/// HTTP client for the thumbnail image provider.
pub struct HttpThumbnailSynthesizer {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ThumbnailRequest<'a> {
    title: &'a str,
    niche: &'a str,
    style: &'a str,
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    image_ref: String,
}

impl HttpThumbnailSynthesizer {
    /// Create a new client from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        let api_key = std::env::var("THUMBNAIL_API_KEY")
            .map_err(|_| GenAiError::config("THUMBNAIL_API_KEY not set"))?;
        let base_url = std::env::var("THUMBNAIL_API_URL")
            .map_err(|_| GenAiError::config("THUMBNAIL_API_URL not set"))?;
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
impl ThumbnailSynthesizer for HttpThumbnailSynthesizer {
    async fn synthesize(&self, title: &str, niche: &str, style: &str) -> GenAiResult<String> {
        debug!(title = %title, niche = %niche, "Generating thumbnail");

        let url = format!("{}/v1/thumbnails", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ThumbnailRequest { title, niche, style })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::Provider { status, body });
        }

        let parsed: ThumbnailResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::schema(format!("thumbnail response did not parse: {}", e)))?;

        if parsed.image_ref.is_empty() {
            return Err(GenAiError::schema("thumbnail response has empty image_ref"));
        }

        Ok(parsed.image_ref)
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
            .and(path("/v1/thumbnails"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"image_ref": "thumb/t.png"})),
            )
            .mount(&server)
            .await;

        let client = HttpThumbnailSynthesizer::new("key", server.uri());
        let image_ref = client.synthesize("Title", "history", "bold").await.unwrap();
        assert_eq!(image_ref, "thumb/t.png");
    }
}
