//! Shared data models for the ReelPilot pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Projects, scenes and pipeline stages
//! - Channel profiles and approval workflows
//! - The structured script-generation response schema
//! - Invocation outcomes and notification kinds

pub mod channel;
pub mod delta;
pub mod project;
pub mod scene;
pub mod script;
pub mod tick;

// Re-export common types
pub use channel::{ApprovalWorkflow, ChannelProfile};
pub use delta::StageDelta;
pub use project::{LogEntry, PipelineStage, Project, ProjectId, ProjectStatus};
pub use scene::{Scene, SceneState};
pub use script::{ScenePrompt, ScriptResponse, ScriptSchemaError};
pub use tick::{NotificationKind, TickOutcome};
