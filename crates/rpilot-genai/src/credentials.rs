//! Platform credential refresh.
//!
//! Refreshes a channel's OAuth access token via the refresh-token grant.
//! Idempotent by construction: a cached token outside the refresh margin is
//! returned unchanged without a provider round-trip.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use rpilot_models::ChannelProfile;

use crate::error::{GenAiError, GenAiResult};
use crate::ports::CredentialRefresher;

/// Refresh margin: refresh a token 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Conservative TTL when the token endpoint omits expires_in.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// OAuth refresh-token client with a per-channel token cache.
pub struct OAuthRefresher {
    token_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
    cache: RwLock<HashMap<String, CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl OAuthRefresher {
    /// Create a refresher from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        let token_url = std::env::var("OAUTH_TOKEN_URL")
            .map_err(|_| GenAiError::config("OAUTH_TOKEN_URL not set"))?;
        let client_id = std::env::var("OAUTH_CLIENT_ID")
            .map_err(|_| GenAiError::config("OAUTH_CLIENT_ID not set"))?;
        let client_secret = std::env::var("OAUTH_CLIENT_SECRET")
            .map_err(|_| GenAiError::config("OAUTH_CLIENT_SECRET not set"))?;
        Ok(Self::new(token_url, client_id, client_secret))
    }

    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn refresh(&self, channel: &ChannelProfile) -> GenAiResult<CachedToken> {
        if channel.refresh_token_ref.is_empty() {
            return Err(GenAiError::credential(format!(
                "channel {} has no refresh token",
                channel.channel_id
            )));
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", channel.refresh_token_ref.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::credential(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::credential(format!("token response did not parse: {}", e)))?;

        let ttl = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(TOKEN_DEFAULT_TTL);

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at: Instant::now() + ttl,
        })
    }
}

#[async_trait]
impl CredentialRefresher for OAuthRefresher {
    async fn ensure_fresh(&self, channel: &ChannelProfile) -> GenAiResult<String> {
        // Fast path: cached token still valid
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&channel.channel_id) {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        // Slow path: refresh under the write lock, double-checking first
        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.get(&channel.channel_id) {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!(channel_id = %channel.channel_id, "Refreshing channel credential");
        let token = self.refresh(channel).await?;
        let access_token = token.access_token.clone();
        cache.insert(channel.channel_id.clone(), token);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_channel() -> ChannelProfile {
        serde_json::from_value(json!({
            "channel_id": "c1",
            "niche": "history",
            "voice_id": "v1",
            "refresh_token_ref": "rt-1"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_fresh_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "at-1", "expires_in": 3600})),
            )
            .expect(1) // second call must hit the cache
            .mount(&server)
            .await;

        let refresher = OAuthRefresher::new(server.uri(), "id", "secret");
        let channel = test_channel();

        assert_eq!(refresher.ensure_fresh(&channel).await.unwrap(), "at-1");
        assert_eq!(refresher.ensure_fresh(&channel).await.unwrap(), "at-1");
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_fast() {
        let refresher = OAuthRefresher::new("http://localhost", "id", "secret");
        let mut channel = test_channel();
        channel.refresh_token_ref = String::new();

        let err = refresher.ensure_fresh(&channel).await.unwrap_err();
        assert!(matches!(err, GenAiError::Credential(_)));
        assert!(!err.is_retryable());
    }
}
