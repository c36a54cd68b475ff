//! Port traits the pipeline engine depends on.
//!
//! Each port is a narrow request-to-result boundary; implementations live in
//! this crate (HTTP clients) or in test code (stubs).

use async_trait::async_trait;
use serde_json::Value;

use rpilot_models::{ChannelProfile, NotificationKind, ScriptResponse};

use crate::error::GenAiResult;

/// Generates a full script plus per-scene prompts for a project title.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, channel: &ChannelProfile, title: &str) -> GenAiResult<ScriptResponse>;
}

/// Synthesizes narration audio for one scene, returning an artifact reference.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, voice_id: &str, text: &str) -> GenAiResult<String>;
}

/// Synthesizes a scene video, returning an artifact reference.
///
/// Implementations may poll a long-running provider job internally; the
/// engine only sees the terminal result.
#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str, aspect_ratio: &str) -> GenAiResult<String>;
}

/// Generates a thumbnail image, returning an artifact reference.
#[async_trait]
pub trait ThumbnailSynthesizer: Send + Sync {
    async fn synthesize(&self, title: &str, niche: &str, style: &str) -> GenAiResult<String>;
}

/// Fire-and-forget operator notification emission.
///
/// Failure to deliver must never fail a pipeline stage, so the method is
/// infallible at call sites; implementations log delivery errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, channel_id: &str, kind: NotificationKind, message: &str, metadata: Value);
}

/// Refreshes a channel's platform credential.
///
/// Must be idempotent: when the current token is not near expiry it is
/// returned unchanged without a provider round-trip.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn ensure_fresh(&self, channel: &ChannelProfile) -> GenAiResult<String>;
}
