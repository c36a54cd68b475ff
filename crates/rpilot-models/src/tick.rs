//! Invocation outcomes and notification kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::project::{PipelineStage, ProjectId};

/// Kind of operator notification emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A project is holding at review and needs human approval
    ApprovalNeeded,
    /// A stage failed and will be retried on a future invocation
    StageError,
    /// A project finished the pipeline
    PipelineComplete,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ApprovalNeeded => "approval_needed",
            NotificationKind::StageError => "stage_error",
            NotificationKind::PipelineComplete => "pipeline_complete",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured result of a single engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// No claimable project; the invocation was a successful no-op
    NoWork,
    /// A project advanced one stage
    Advanced {
        project_id: ProjectId,
        previous_stage: PipelineStage,
        new_stage: PipelineStage,
    },
    /// A project made partial progress (or none) and stays at its stage
    Held {
        project_id: ProjectId,
        stage: PipelineStage,
    },
    /// The claimed project's stage failed this invocation
    Failed {
        project_id: ProjectId,
        stage: PipelineStage,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = TickOutcome::Advanced {
            project_id: ProjectId::from_string("p1"),
            previous_stage: PipelineStage::Scripting,
            new_stage: PipelineStage::Audio,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "advanced");
        assert_eq!(json["previous_stage"], "scripting");
        assert_eq!(json["new_stage"], "audio");
    }
}
