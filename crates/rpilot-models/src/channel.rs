//! Channel profile models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a channel's finished projects leave the review stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalWorkflow {
    /// Advance to ready without human sign-off
    AutoPublish,
    /// Hold at review until a reviewer sets the approved flag
    #[default]
    ManualReview,
}

/// Read-only channel profile consumed by the capability ports.
///
/// Channels are owned by an external management surface; the engine only
/// reads them to parameterize generation calls.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChannelProfile {
    /// Unique channel ID
    pub channel_id: String,

    /// Content niche, e.g. "history" or "finance"
    pub niche: String,

    /// Narration tone hint for script generation
    #[serde(default)]
    pub tone: String,

    /// Target audience description
    #[serde(default)]
    pub audience: String,

    /// Voice ID for the synthesis provider
    pub voice_id: String,

    /// Target aspect ratio for scene videos, e.g. "9:16"
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Review policy for finished projects
    #[serde(default)]
    pub approval_workflow: ApprovalWorkflow,

    /// Opaque handle to the channel's stored OAuth refresh token
    #[serde(default)]
    pub refresh_token_ref: String,
}

fn default_aspect_ratio() -> String {
    "9:16".to_string()
}

impl ChannelProfile {
    pub fn auto_publish(&self) -> bool {
        self.approval_workflow == ApprovalWorkflow::AutoPublish
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = r#"{"channel_id":"c1","niche":"history","voice_id":"v1"}"#;
        let channel: ChannelProfile = serde_json::from_str(json).unwrap();
        assert_eq!(channel.aspect_ratio, "9:16");
        assert_eq!(channel.approval_workflow, ApprovalWorkflow::ManualReview);
        assert!(!channel.auto_publish());
    }
}
