//! Project persistence and the single-flight claim.
//!
//! `claim_next` is the concurrency linchpin: the lease write is a
//! conditional update on the document's `updateTime`, so of two overlapping
//! invocations racing for the same project exactly one wins and the other
//! moves on to the next candidate.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};

use rpilot_models::{ChannelProfile, Project, ProjectId, ProjectStatus, StageDelta};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_claim_contention;
use crate::retry::with_retry;
use crate::types::{
    from_fields, json_to_value, to_fields, CollectionSelector, FieldFilter, FieldReference, Filter,
    Order, StructuredQuery, Value,
};

const PROJECTS_COLLECTION: &str = "projects";
const CHANNELS_COLLECTION: &str = "channels";

/// How many oldest candidates one claim attempt walks before giving up.
const CLAIM_CANDIDATES: i32 = 10;

/// Proof of an exclusive, time-bounded lease on a project.
///
/// The `update_time` is the Firestore precondition token: any later write
/// through this claim fails if someone else touched the document.
#[derive(Debug, Clone)]
pub struct ClaimToken {
    pub project_id: ProjectId,
    pub update_time: String,
}

/// A claimed project snapshot plus the token to write it back.
#[derive(Debug, Clone)]
pub struct ClaimedProject {
    pub project: Project,
    pub claim: ClaimToken,
}

/// Persistence port for the pipeline engine.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Atomically claim the oldest eligible project, if any.
    async fn claim_next(
        &self,
        worker_id: &str,
        lease_ttl_secs: i64,
    ) -> FirestoreResult<Option<ClaimedProject>>;

    /// Load a project snapshot without claiming it.
    async fn load(&self, project_id: &ProjectId) -> FirestoreResult<Option<Project>>;

    /// Load the channel profile a project belongs to.
    async fn load_channel(&self, channel_id: &str) -> FirestoreResult<Option<ChannelProfile>>;

    /// Persist a stage delta as one masked, precondition-guarded update.
    /// Returns the refreshed claim token.
    async fn apply_delta(
        &self,
        claim: &ClaimToken,
        project: &Project,
        delta: &StageDelta,
    ) -> FirestoreResult<ClaimToken>;

    /// Release the lease. Best-effort: on failure the lease TTL expires it.
    async fn release(&self, claim: &ClaimToken) -> FirestoreResult<()>;
}

/// Firestore-backed project store.
pub struct FirestoreProjectStore {
    client: FirestoreClient,
}

impl FirestoreProjectStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env().await?))
    }

    fn eligible_query() -> StructuredQuery {
        StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: PROJECTS_COLLECTION.to_string(),
                all_descendants: None,
            }],
            filter: Some(Filter {
                field_filter: Some(FieldFilter {
                    field: FieldReference {
                        field_path: "status".to_string(),
                    },
                    op: "EQUAL".to_string(),
                    value: Value::StringValue(ProjectStatus::Production.as_str().to_string()),
                }),
            }),
            order_by: Some(vec![Order {
                field: FieldReference {
                    field_path: "created_at".to_string(),
                },
                direction: "ASCENDING".to_string(),
            }]),
            limit: Some(CLAIM_CANDIDATES),
        }
    }

    /// Attempt the lease write for one candidate. `Ok(None)` means another
    /// invocation won the race.
    async fn try_claim(
        &self,
        project: &Project,
        update_time: &str,
        worker_id: &str,
        lease_ttl_secs: i64,
    ) -> FirestoreResult<Option<ClaimToken>> {
        let lease_expires_at = Utc::now() + ChronoDuration::seconds(lease_ttl_secs);

        let mut fields = HashMap::new();
        fields.insert(
            "claimed_by".to_string(),
            Value::StringValue(worker_id.to_string()),
        );
        fields.insert(
            "lease_expires_at".to_string(),
            Value::StringValue(lease_expires_at.to_rfc3339()),
        );

        let result = self
            .client
            .patch_document(
                PROJECTS_COLLECTION,
                project.project_id.as_str(),
                fields,
                &["claimed_by", "lease_expires_at"],
                Some(update_time),
            )
            .await;

        match result {
            Ok(doc) => {
                let new_time = doc.update_time.ok_or_else(|| {
                    FirestoreError::invalid_document("claim write returned no updateTime")
                })?;
                Ok(Some(ClaimToken {
                    project_id: project.project_id.clone(),
                    update_time: new_time,
                }))
            }
            Err(e) if e.is_precondition_failed() => {
                record_claim_contention();
                debug!(project_id = %project.project_id, "Lost claim race, trying next candidate");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProjectStore for FirestoreProjectStore {
    async fn claim_next(
        &self,
        worker_id: &str,
        lease_ttl_secs: i64,
    ) -> FirestoreResult<Option<ClaimedProject>> {
        let docs = with_retry(self.client.retry_config(), "claim_query", || {
            self.client.run_query(Self::eligible_query())
        })
        .await?;
        let now = Utc::now();

        for doc in docs {
            let Some(fields) = doc.fields.as_ref() else {
                continue;
            };
            let project: Project = match from_fields(fields) {
                Ok(p) => p,
                Err(e) => {
                    warn!(doc_id = ?doc.doc_id(), "Skipping unparseable project: {}", e);
                    continue;
                }
            };
            if !project.is_claimable(now) {
                continue;
            }
            let Some(update_time) = doc.update_time.as_deref() else {
                continue;
            };

            if let Some(claim) = self
                .try_claim(&project, update_time, worker_id, lease_ttl_secs)
                .await?
            {
                info!(
                    project_id = %project.project_id,
                    stage = %project.pipeline_stage,
                    "Claimed project"
                );
                let mut project = project;
                project.claimed_by = Some(worker_id.to_string());
                return Ok(Some(ClaimedProject { project, claim }));
            }
        }

        Ok(None)
    }

    async fn load(&self, project_id: &ProjectId) -> FirestoreResult<Option<Project>> {
        let doc = with_retry(self.client.retry_config(), "load_project", || {
            self.client
                .get_document(PROJECTS_COLLECTION, project_id.as_str())
        })
        .await?;
        match doc.and_then(|d| d.fields) {
            Some(fields) => Ok(Some(from_fields(&fields)?)),
            None => Ok(None),
        }
    }

    async fn load_channel(&self, channel_id: &str) -> FirestoreResult<Option<ChannelProfile>> {
        let doc = with_retry(self.client.retry_config(), "load_channel", || {
            self.client.get_document(CHANNELS_COLLECTION, channel_id)
        })
        .await?;
        match doc.and_then(|d| d.fields) {
            Some(fields) => Ok(Some(from_fields(&fields)?)),
            None => Ok(None),
        }
    }

    async fn apply_delta(
        &self,
        claim: &ClaimToken,
        project: &Project,
        delta: &StageDelta,
    ) -> FirestoreResult<ClaimToken> {
        // Apply in memory, then write only the touched fields
        let mut updated = project.clone();
        delta.apply_to(&mut updated);

        let all_fields = to_fields(&updated)?;
        let mut mask: Vec<&str> = delta.touched_fields();
        mask.push("updated_at");

        let mut fields: HashMap<String, Value> = HashMap::new();
        for name in &mask {
            let value = all_fields
                .get(*name)
                .cloned()
                // Touched Option fields absent from serialization were cleared
                .unwrap_or_else(|| json_to_value(&serde_json::Value::Null));
            fields.insert((*name).to_string(), value);
        }

        let doc = self
            .client
            .patch_document(
                PROJECTS_COLLECTION,
                claim.project_id.as_str(),
                fields,
                &mask,
                Some(&claim.update_time),
            )
            .await?;

        let new_time = doc.update_time.ok_or_else(|| {
            FirestoreError::invalid_document("delta write returned no updateTime")
        })?;
        Ok(ClaimToken {
            project_id: claim.project_id.clone(),
            update_time: new_time,
        })
    }

    async fn release(&self, claim: &ClaimToken) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("claimed_by".to_string(), Value::NullValue(()));
        fields.insert("lease_expires_at".to_string(), Value::NullValue(()));

        self.client
            .patch_document(
                PROJECTS_COLLECTION,
                claim.project_id.as_str(),
                fields,
                &["claimed_by", "lease_expires_at"],
                Some(&claim.update_time),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use crate::retry::RetryConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(uri: &str) -> FirestoreProjectStore {
        let config = FirestoreConfig {
            project_id: "test".to_string(),
            database_id: "(default)".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            retry: RetryConfig {
                max_retries: 0,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
        };
        let client = FirestoreClient::with_endpoint(
            config,
            format!("{}/documents", uri),
            "test-token",
        )
        .unwrap();
        FirestoreProjectStore::new(client)
    }

    fn project_doc(id: &str) -> serde_json::Value {
        let project = Project::new("c1", "Title", "history");
        let mut fields = serde_json::Map::new();
        for (k, v) in to_fields(&project).unwrap() {
            fields.insert(k, serde_json::to_value(v).unwrap());
        }
        // Stable ID so the mock paths line up
        fields.insert(
            "project_id".to_string(),
            serde_json::to_value(json_to_value(&json!(id))).unwrap(),
        );
        json!({
            "name": format!("projects/test/databases/(default)/documents/projects/{}", id),
            "fields": fields,
            "updateTime": "2026-01-01T00:00:00.000000Z"
        })
    }

    #[tokio::test]
    async fn test_claim_next_no_candidates_is_no_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents:runQuery"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"readTime": "t"}])))
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let claimed = store.claim_next("worker-1", 120).await.unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_claim_next_wins_race_on_first_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents:runQuery"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"document": project_doc("p1")}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/documents/projects/p1"))
            .and(query_param(
                "currentDocument.updateTime",
                "2026-01-01T00:00:00.000000Z",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test/databases/(default)/documents/projects/p1",
                "fields": {},
                "updateTime": "2026-01-01T00:00:01.000000Z"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let claimed = store.claim_next("worker-1", 120).await.unwrap().unwrap();
        assert_eq!(claimed.claim.project_id.as_str(), "p1");
        assert_eq!(claimed.claim.update_time, "2026-01-01T00:00:01.000000Z");
        assert_eq!(claimed.project.claimed_by.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn test_load_missing_project_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents/projects/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let loaded = store
            .load(&rpilot_models::ProjectId::from_string("ghost"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_claim_next_moves_on_after_lost_race() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents:runQuery"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"document": project_doc("p1")},
                {"document": project_doc("p2")}
            ])))
            .mount(&server)
            .await;
        // p1 write loses the race
        Mock::given(method("PATCH"))
            .and(path("/documents/projects/p1"))
            .respond_with(ResponseTemplate::new(412).set_body_string("FAILED_PRECONDITION"))
            .mount(&server)
            .await;
        // p2 write succeeds
        Mock::given(method("PATCH"))
            .and(path("/documents/projects/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test/databases/(default)/documents/projects/p2",
                "fields": {},
                "updateTime": "2026-01-01T00:00:02.000000Z"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let claimed = store.claim_next("worker-1", 120).await.unwrap().unwrap();
        assert_eq!(claimed.claim.project_id.as_str(), "p2");
    }
}
