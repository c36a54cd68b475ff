//! Firestore REST API client.
//!
//! Tuned HTTP client with token caching, masked document updates,
//! optimistic-concurrency preconditions and structured queries. Every
//! request is traced and recorded in metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Method, StatusCode};
use tracing::{info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::TokenCache;
use crate::types::{Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error("GCP_PROJECT_ID cannot be empty"));
        }

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(
                std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            retry: RetryConfig::from_env(),
        })
    }
}

enum AuthMode {
    Cached(Arc<TokenCache>),
    /// Fixed token for emulator and test endpoints.
    Static(String),
}

/// Firestore REST API client.
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Arc<AuthMode>,
}

impl Clone for FirestoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;
        let provider: Arc<dyn TokenProvider> = match service_account {
            Some(sa) => Arc::new(sa),
            None => {
                return Err(FirestoreError::auth_error(
                    "GOOGLE_APPLICATION_CREDENTIALS not set. \
                     Set it to the path of your service account JSON file.",
                ))
            }
        };

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );
        let auth = AuthMode::Cached(Arc::new(TokenCache::new(provider)));
        Self::build(config, base_url, auth)
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    /// Create a client against an arbitrary endpoint with a fixed token
    /// (emulator or test server).
    pub fn with_endpoint(
        config: FirestoreConfig,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> FirestoreResult<Self> {
        Self::build(config, base_url.into(), AuthMode::Static(token.into()))
    }

    fn build(config: FirestoreConfig, base_url: String, auth: AuthMode) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("rpilot-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        Ok(Self {
            http,
            config,
            base_url,
            auth: Arc::new(auth),
        })
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    async fn get_token(&self) -> FirestoreResult<String> {
        match self.auth.as_ref() {
            AuthMode::Cached(cache) => cache.get_token().await,
            AuthMode::Static(token) => Ok(token.clone()),
        }
    }

    async fn invalidate_token(&self) {
        if let AuthMode::Cached(cache) = self.auth.as_ref() {
            cache.invalidate().await;
        }
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Send a request, refreshing the auth token once if Firestore reports
    /// it expired mid-flight.
    async fn send_authorized(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> FirestoreResult<reqwest::Response> {
        for attempt in 0..2 {
            let token = self.get_token().await?;
            let mut request = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(json) = body {
                request = request.json(json);
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                let text = response.text().await.unwrap_or_default();
                if Self::is_access_token_expired(&text) {
                    self.invalidate_token().await;
                    continue;
                }
                return Err(FirestoreError::from_http_status(
                    401,
                    format!("{} failed: {}", url, text),
                ));
            }
            return Ok(response);
        }
        // Second pass always returns above; reaching here means the refreshed
        // token was also rejected.
        Err(FirestoreError::auth_error(format!(
            "{} failed: token rejected after refresh",
            url
        )))
    }

    async fn error_from(url: &str, response: reqwest::Response) -> FirestoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status, format!("{} failed: {}", url, body))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Get a document; `Ok(None)` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self.send_authorized(Method::GET, &url, None).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(Self::error_from(&url, response).await),
            }
        })
        .await
    }

    /// Patch a document with an update mask and optional `updateTime`
    /// precondition. The precondition makes the write a compare-and-swap:
    /// it fails with `PreconditionFailed` if the document changed since the
    /// caller read it.
    pub async fn patch_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: &[&str],
        precondition_update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        let mut params: Vec<String> = update_mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", f))
            .collect();
        if let Some(ts) = precondition_update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let body = serde_json::to_value(Document::new(fields))?;

        self.execute_request("patch_document", collection, Some(doc_id), async {
            let response = self.send_authorized(Method::PATCH, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(text))
                }
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id)))
                }
                _ => Err(Self::error_from(&url, response).await),
            }
        })
        .await
    }

    /// Run a structured query against a collection under the documents root.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let body = serde_json::to_value(RunQueryRequest {
            structured_query: query,
        })?;

        self.execute_request("run_query", "query", None, async {
            let response = self.send_authorized(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => {
                    let text = response.text().await.unwrap_or_default();
                    let rows: Vec<RunQueryResponse> = serde_json::from_str(&text).map_err(|e| {
                        let prefix: String = text.chars().take(200).collect();
                        FirestoreError::request_failed(format!(
                            "Failed to parse runQuery response: {} (body prefix: {})",
                            e, prefix
                        ))
                    })?;
                    Ok(rows.into_iter().filter_map(|r| r.document).collect())
                }
                _ => Err(Self::error_from(&url, response).await),
            }
        })
        .await
    }

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = match doc_id {
            Some(id) => info_span!(
                "firestore_request",
                operation = %operation,
                collection = %collection,
                doc_id = %id
            ),
            None => info_span!(
                "firestore_request",
                operation = %operation,
                collection = %collection
            ),
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }
}
