//! Worker configuration.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity written into the lease when claiming a project
    pub worker_id: String,
    /// Maximum scenes the audio stage advances per invocation
    pub audio_scene_cap: usize,
    /// Per-scene retry cap before a scene is permanently skipped
    pub max_scene_retries: u32,
    /// Lease duration; a crashed invocation's project becomes claimable
    /// again once this expires
    pub lease_ttl: Duration,
    /// Wall-clock budget for one invocation; backoff delays that would
    /// cross it abandon the remaining attempts
    pub invocation_budget: Duration,
    /// In-invocation retry policy for provider calls
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            audio_scene_cap: 2,
            max_scene_retries: 3,
            lease_ttl: Duration::from_secs(120),
            invocation_budget: Duration::from_secs(25),
            retry: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            worker_id: std::env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4())),
            audio_scene_cap: std::env::var("AUDIO_SCENE_CAP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            max_scene_retries: std::env::var("MAX_SCENE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            lease_ttl: Duration::from_secs(
                std::env::var("LEASE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            invocation_budget: Duration::from_secs(
                std::env::var("INVOCATION_BUDGET_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(25),
            ),
            retry: RetryConfig::from_env(),
        }
    }
}
