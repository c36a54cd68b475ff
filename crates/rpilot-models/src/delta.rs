//! Stage deltas: the partial update a stage processor returns.

use crate::project::{LogEntry, PipelineStage, Project, ProjectStatus};
use crate::scene::Scene;

/// Partial project update produced by one stage processor run.
///
/// `None` fields are untouched. `last_error` and `last_notified_digest` use a
/// nested Option so a delta can explicitly clear them.
#[derive(Debug, Clone, Default)]
pub struct StageDelta {
    /// New pipeline stage, when the stage advanced
    pub stage: Option<PipelineStage>,

    /// New lifecycle status
    pub status: Option<ProjectStatus>,

    /// Script produced by the scripting stage
    pub script: Option<String>,

    /// Full replacement scene list
    pub scenes: Option<Vec<Scene>>,

    /// Thumbnail reference
    pub thumbnail_ref: Option<String>,

    /// Merge manifest JSON
    pub merge_manifest: Option<String>,

    /// Set (`Some(Some(_))`) or clear (`Some(None)`) the terminal error
    pub last_error: Option<Option<String>>,

    /// Set or clear the notification dedup digest
    pub last_notified_digest: Option<Option<String>>,

    /// Log lines to append
    pub logs: Vec<LogEntry>,
}

impl StageDelta {
    /// A delta that changes nothing.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// True when persisting this delta would be a no-op.
    pub fn is_empty(&self) -> bool {
        self.stage.is_none()
            && self.status.is_none()
            && self.script.is_none()
            && self.scenes.is_none()
            && self.thumbnail_ref.is_none()
            && self.merge_manifest.is_none()
            && self.last_error.is_none()
            && self.last_notified_digest.is_none()
            && self.logs.is_empty()
    }

    /// Append a log line tagged with the project's current stage.
    pub fn log(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.logs.push(LogEntry::new(stage, message));
    }

    /// Field names (Project serde names) this delta touches, for a masked
    /// storage update. Logs and `updated_at` are handled by the store.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.stage.is_some() {
            fields.push("pipeline_stage");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.script.is_some() {
            fields.push("script");
        }
        if self.scenes.is_some() {
            fields.push("scenes");
        }
        if self.thumbnail_ref.is_some() {
            fields.push("thumbnail_ref");
        }
        if self.merge_manifest.is_some() {
            fields.push("merge_manifest");
        }
        if self.last_error.is_some() {
            fields.push("last_error");
        }
        if self.last_notified_digest.is_some() {
            fields.push("last_notified_digest");
        }
        if !self.logs.is_empty() {
            fields.push("logs");
        }
        fields
    }

    /// Apply the delta to an in-memory project snapshot.
    ///
    /// Stage updates assert forward-only progression: a delta can never move
    /// a project to an earlier stage.
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(stage) = self.stage {
            debug_assert!(stage.position() >= project.pipeline_stage.position());
            if stage.position() >= project.pipeline_stage.position() {
                project.pipeline_stage = stage;
            }
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(ref script) = self.script {
            project.script = Some(script.clone());
        }
        if let Some(ref scenes) = self.scenes {
            project.scenes = scenes.clone();
        }
        if let Some(ref thumbnail_ref) = self.thumbnail_ref {
            project.thumbnail_ref = Some(thumbnail_ref.clone());
        }
        if let Some(ref manifest) = self.merge_manifest {
            project.merge_manifest = Some(manifest.clone());
        }
        if let Some(ref last_error) = self.last_error {
            project.last_error = last_error.clone();
        }
        if let Some(ref digest) = self.last_notified_digest {
            project.last_notified_digest = digest.clone();
        }
        project.logs.extend(self.logs.iter().cloned());
        project.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::PipelineStage;

    #[test]
    fn test_unchanged_is_empty() {
        assert!(StageDelta::unchanged().is_empty());
    }

    #[test]
    fn test_log_makes_delta_non_empty() {
        let mut delta = StageDelta::unchanged();
        delta.log(PipelineStage::Audio, "synthesized scene 0");
        assert!(!delta.is_empty());
        assert_eq!(delta.touched_fields(), vec!["logs"]);
    }

    #[test]
    fn test_apply_advances_stage_and_appends_logs() {
        let mut project = Project::new("c1", "t", "n");
        let mut delta = StageDelta {
            stage: Some(PipelineStage::Audio),
            script: Some("script".to_string()),
            last_error: Some(None),
            ..Default::default()
        };
        delta.log(PipelineStage::Scripting, "script generated");

        delta.apply_to(&mut project);
        assert_eq!(project.pipeline_stage, PipelineStage::Audio);
        assert_eq!(project.script.as_deref(), Some("script"));
        assert_eq!(project.logs.len(), 1);
        assert!(project.last_error.is_none());
    }

    #[test]
    fn test_apply_never_regresses_stage() {
        let mut project = Project::new("c1", "t", "n");
        project.pipeline_stage = PipelineStage::Merging;

        let delta = StageDelta {
            stage: Some(PipelineStage::Audio),
            ..Default::default()
        };
        // debug_assert fires in debug builds; release behavior is a no-op
        if cfg!(not(debug_assertions)) {
            delta.apply_to(&mut project);
            assert_eq!(project.pipeline_stage, PipelineStage::Merging);
        }
    }

    #[test]
    fn test_clear_error_is_explicit() {
        let mut project = Project::new("c1", "t", "n");
        project.last_error = Some("boom".to_string());

        // Untouched delta leaves the error alone
        StageDelta::unchanged().apply_to(&mut project);
        assert!(project.last_error.is_some());

        // Explicit clear removes it
        let delta = StageDelta {
            last_error: Some(None),
            ..Default::default()
        };
        delta.apply_to(&mut project);
        assert!(project.last_error.is_none());
    }
}
