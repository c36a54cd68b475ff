//! The pipeline engine: claim one project, run its stage, persist, release.
//!
//! One invocation touches at most one project and performs at most one
//! stage transition. Everything the stage did is persisted as a single
//! masked write guarded by the claim's update-time precondition.

use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use rpilot_firestore::{ClaimedProject, ProjectStore};
use rpilot_genai::{
    CredentialRefresher, Notifier, ScriptGenerator, ThumbnailSynthesizer, VideoSynthesizer,
    VoiceSynthesizer,
};
use rpilot_models::{NotificationKind, Project, ProjectStatus, StageDelta, TickOutcome};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::ProjectLogger;
use crate::retry::Budget;
use crate::stages::{self, StageContext};

/// Capability ports the stage processors call out through.
pub struct Ports {
    pub script: Arc<dyn ScriptGenerator>,
    pub voice: Arc<dyn VoiceSynthesizer>,
    pub video: Arc<dyn VideoSynthesizer>,
    pub thumbnail: Arc<dyn ThumbnailSynthesizer>,
    pub notifier: Arc<dyn Notifier>,
    pub credentials: Arc<dyn CredentialRefresher>,
}

/// Resumable pipeline engine over a project store.
pub struct PipelineEngine {
    store: Arc<dyn ProjectStore>,
    ports: Ports,
    config: WorkerConfig,
}

impl PipelineEngine {
    pub fn new(store: Arc<dyn ProjectStore>, ports: Ports, config: WorkerConfig) -> Self {
        Self {
            store,
            ports,
            config,
        }
    }

    /// Run one invocation: claim, process, persist, release.
    pub async fn tick(&self) -> WorkerResult<TickOutcome> {
        let budget = Budget::new(self.config.invocation_budget);

        let claimed = self
            .store
            .claim_next(&self.config.worker_id, self.config.lease_ttl.as_secs() as i64)
            .await?;
        let Some(ClaimedProject { project, claim }) = claimed else {
            debug!("No claimable project");
            record_tick("no_work");
            return Ok(TickOutcome::NoWork);
        };

        let logger = ProjectLogger::new(&project.project_id, project.pipeline_stage.as_str());
        let span = info_span!(
            "tick",
            project_id = %project.project_id,
            stage = %project.pipeline_stage
        );

        let delta = match self.store.load_channel(&project.channel_id).await {
            Ok(Some(channel)) => {
                let ctx = StageContext {
                    project: &project,
                    channel: &channel,
                    ports: &self.ports,
                    config: &self.config,
                    budget: &budget,
                    logger: &logger,
                };
                stages::run_stage(&ctx).instrument(span).await
            }
            Ok(None) => {
                // Orphaned project; nothing downstream can run without the
                // channel profile
                let message = format!("Channel {} not found", project.channel_id);
                logger.log_error(&message);
                let mut delta = StageDelta::unchanged();
                delta.status = Some(ProjectStatus::Failed);
                delta.last_error = Some(Some(message.clone()));
                delta.log(project.pipeline_stage, message.clone());
                self.ports
                    .notifier
                    .emit(
                        &project.channel_id,
                        NotificationKind::StageError,
                        &message,
                        serde_json::json!({ "project_id": project.project_id }),
                    )
                    .await;
                delta
            }
            Err(e) => {
                if let Err(release_err) = self.store.release(&claim).await {
                    warn!(
                        "Failed to release lease, the TTL will expire it: {}",
                        release_err
                    );
                }
                return Err(e.into());
            }
        };

        let outcome = outcome_for(&project, &delta);

        let claim = if delta.is_empty() {
            claim
        } else {
            match self.store.apply_delta(&claim, &project, &delta).await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    if let Err(release_err) = self.store.release(&claim).await {
                        warn!(
                            "Failed to release lease, the TTL will expire it: {}",
                            release_err
                        );
                    }
                    return Err(e.into());
                }
            }
        };
        if let Err(e) = self.store.release(&claim).await {
            warn!("Failed to release lease, the TTL will expire it: {}", e);
        }

        record_tick(outcome_label(&outcome));
        Ok(outcome)
    }
}

/// Classify the invocation from the delta the stage produced.
fn outcome_for(project: &Project, delta: &StageDelta) -> TickOutcome {
    if delta.status == Some(ProjectStatus::Failed) {
        let error = match &delta.last_error {
            Some(Some(message)) => message.clone(),
            _ => "stage failed".to_string(),
        };
        return TickOutcome::Failed {
            project_id: project.project_id.clone(),
            stage: project.pipeline_stage,
            error,
        };
    }
    if let Some(new_stage) = delta.stage {
        return TickOutcome::Advanced {
            project_id: project.project_id.clone(),
            previous_stage: project.pipeline_stage,
            new_stage,
        };
    }
    TickOutcome::Held {
        project_id: project.project_id.clone(),
        stage: project.pipeline_stage,
    }
}

fn outcome_label(outcome: &TickOutcome) -> &'static str {
    match outcome {
        TickOutcome::NoWork => "no_work",
        TickOutcome::Advanced { .. } => "advanced",
        TickOutcome::Held { .. } => "held",
        TickOutcome::Failed { .. } => "failed",
    }
}

fn record_tick(outcome: &'static str) {
    metrics::counter!("pipeline_ticks_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpilot_models::PipelineStage;

    #[test]
    fn test_outcome_failed_takes_precedence() {
        let project = Project::new("c1", "t", "n");
        let delta = StageDelta {
            status: Some(ProjectStatus::Failed),
            stage: Some(PipelineStage::Audio),
            last_error: Some(Some("boom".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            outcome_for(&project, &delta),
            TickOutcome::Failed { error, .. } if error == "boom"
        ));
    }

    #[test]
    fn test_outcome_advanced_reports_both_stages() {
        let project = Project::new("c1", "t", "n");
        let delta = StageDelta {
            stage: Some(PipelineStage::Audio),
            ..Default::default()
        };
        match outcome_for(&project, &delta) {
            TickOutcome::Advanced {
                previous_stage,
                new_stage,
                ..
            } => {
                assert_eq!(previous_stage, PipelineStage::Scripting);
                assert_eq!(new_stage, PipelineStage::Audio);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_default_is_held() {
        let project = Project::new("c1", "t", "n");
        assert!(matches!(
            outcome_for(&project, &StageDelta::unchanged()),
            TickOutcome::Held { .. }
        ));
    }
}
