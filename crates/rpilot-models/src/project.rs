//! Project models: the unit of pipeline work.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::scene::Scene;

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random project ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Created but not yet queued for production
    Draft,
    /// Moving through the pipeline
    #[default]
    Production,
    /// Pipeline finished, awaiting publish
    Ready,
    /// Published to the platform
    Published,
    /// Terminally failed after exhausting retries
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Production => "production",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Published => "published",
            ProjectStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ProjectStatus::Draft),
            "production" => Some(ProjectStatus::Production),
            "ready" => Some(ProjectStatus::Ready),
            "published" => Some(ProjectStatus::Published),
            "failed" => Some(ProjectStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage. The order of the variants is the fixed pipeline order;
/// a project only ever moves forward through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Generate the script and per-scene prompts
    #[default]
    Scripting,
    /// Synthesize per-scene narration audio
    Audio,
    /// Synthesize per-scene video
    Visuals,
    /// Generate the thumbnail image
    Thumbnail,
    /// Build the merge manifest from scene artifacts
    Merging,
    /// Hold for human approval (or auto-publish)
    Review,
    /// Pipeline complete; hand-off to the publisher
    Ready,
}

impl PipelineStage {
    /// All stages in pipeline order.
    pub const ORDER: [PipelineStage; 7] = [
        PipelineStage::Scripting,
        PipelineStage::Audio,
        PipelineStage::Visuals,
        PipelineStage::Thumbnail,
        PipelineStage::Merging,
        PipelineStage::Review,
        PipelineStage::Ready,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Scripting => "scripting",
            PipelineStage::Audio => "audio",
            PipelineStage::Visuals => "visuals",
            PipelineStage::Thumbnail => "thumbnail",
            PipelineStage::Merging => "merging",
            PipelineStage::Review => "review",
            PipelineStage::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scripting" => Some(PipelineStage::Scripting),
            "audio" => Some(PipelineStage::Audio),
            "visuals" => Some(PipelineStage::Visuals),
            "thumbnail" => Some(PipelineStage::Thumbnail),
            "merging" => Some(PipelineStage::Merging),
            "review" => Some(PipelineStage::Review),
            "ready" => Some(PipelineStage::Ready),
            _ => None,
        }
    }

    /// Position in the fixed pipeline order. Used to assert monotonic
    /// progression: a stage update must never decrease this value.
    pub fn position(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| s == self)
            .unwrap_or(Self::ORDER.len())
    }

    /// The engine has nothing left to do at this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Ready)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in a project's append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LogEntry {
    /// When the entry was appended
    pub at: DateTime<Utc>,

    /// Stage the project was in when the entry was appended
    pub stage: PipelineStage,

    /// Human-readable message
    pub message: String,
}

impl LogEntry {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            stage,
            message: message.into(),
        }
    }
}

/// A content project moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    /// Unique project ID
    pub project_id: ProjectId,

    /// Owning channel
    pub channel_id: String,

    /// Video title, set at ideation time
    pub title: String,

    /// Channel niche (feeds the script and thumbnail prompts)
    #[serde(default)]
    pub niche: String,

    /// Visual style hint for thumbnail generation
    #[serde(default)]
    pub style: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: ProjectStatus,

    /// Current pipeline stage
    #[serde(default)]
    pub pipeline_stage: PipelineStage,

    /// Per-scene sub-units; empty until scripting completes
    #[serde(default)]
    pub scenes: Vec<Scene>,

    /// Full narration script produced by the scripting stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Thumbnail image reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,

    /// Final video reference (set by the downstream publisher)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,

    /// Deterministic merge manifest (JSON), built by the merging stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_manifest: Option<String>,

    /// Append-only audit trail
    #[serde(default)]
    pub logs: Vec<LogEntry>,

    /// Most recent terminal error, cleared on successful stage advance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Human approval flag, set out-of-band by a reviewer
    #[serde(default)]
    pub approved: bool,

    /// Digest of the last emitted notification, for dedup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notified_digest: Option<String>,

    /// Invocation currently holding the lease on this project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    /// Lease expiry; a stale lease is claimable again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Creation timestamp (claim order is oldest-first on this)
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project at the head of the pipeline.
    pub fn new(
        channel_id: impl Into<String>,
        title: impl Into<String>,
        niche: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            project_id: ProjectId::new(),
            channel_id: channel_id.into(),
            title: title.into(),
            niche: niche.into(),
            style: String::new(),
            status: ProjectStatus::Production,
            pipeline_stage: PipelineStage::Scripting,
            scenes: Vec::new(),
            script: None,
            thumbnail_ref: None,
            video_ref: None,
            merge_manifest: None,
            logs: Vec::new(),
            last_error: None,
            approved: false,
            last_notified_digest: None,
            claimed_by: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the project is eligible for claiming at `now`.
    ///
    /// A project qualifies when it is in production at a non-terminal stage
    /// and no other invocation holds an unexpired lease on it.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        if self.status != ProjectStatus::Production || self.pipeline_stage.is_terminal() {
            return false;
        }
        match (&self.claimed_by, self.lease_expires_at) {
            (Some(_), Some(expires)) => expires <= now,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stage_order_is_monotonic() {
        let mut last = None;
        for stage in PipelineStage::ORDER {
            let pos = stage.position();
            if let Some(prev) = last {
                assert!(pos > prev);
            }
            last = Some(pos);
        }
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in PipelineStage::ORDER {
            assert_eq!(PipelineStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(PipelineStage::parse("bogus"), None);
    }

    #[test]
    fn test_only_ready_is_terminal() {
        for stage in PipelineStage::ORDER {
            assert_eq!(stage.is_terminal(), stage == PipelineStage::Ready);
        }
    }

    #[test]
    fn test_claimable_requires_production() {
        let mut project = Project::new("chan-1", "Title", "history");
        assert!(project.is_claimable(Utc::now()));

        project.status = ProjectStatus::Ready;
        assert!(!project.is_claimable(Utc::now()));
    }

    #[test]
    fn test_claimable_respects_unexpired_lease() {
        let now = Utc::now();
        let mut project = Project::new("chan-1", "Title", "history");
        project.claimed_by = Some("worker-a".to_string());
        project.lease_expires_at = Some(now + Duration::seconds(60));
        assert!(!project.is_claimable(now));

        // Expired lease is claimable again
        project.lease_expires_at = Some(now - Duration::seconds(1));
        assert!(project.is_claimable(now));
    }

    #[test]
    fn test_terminal_stage_not_claimable() {
        let mut project = Project::new("chan-1", "Title", "history");
        project.pipeline_stage = PipelineStage::Ready;
        assert!(!project.is_claimable(Utc::now()));
    }

    #[test]
    fn test_project_serde_roundtrip() {
        let project = Project::new("chan-1", "Ancient Rome in 60s", "history");
        let json = serde_json::to_string(&project).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back.project_id, project.project_id);
        assert_eq!(back.pipeline_stage, PipelineStage::Scripting);
        assert_eq!(back.status, ProjectStatus::Production);
        assert!(back.scenes.is_empty());
    }
}
