//! Stage processors: one module per pipeline stage.
//!
//! A processor inspects the claimed project, performs a bounded amount of
//! work against the capability ports, and returns a [`StageDelta`] for the
//! store to persist. Processors never write to storage themselves.

pub mod audio;
pub mod merging;
pub mod review;
pub mod scripting;
pub mod thumbnail;
pub mod visuals;

use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::debug;

use rpilot_models::{
    ChannelProfile, NotificationKind, PipelineStage, Project, ProjectStatus, Scene, StageDelta,
};

use crate::config::WorkerConfig;
use crate::engine::Ports;
use crate::logging::ProjectLogger;
use crate::retry::Budget;
use crate::scenes::{all_terminal, skipped_indexes, SceneAdvance};

/// Everything a stage processor needs for one invocation.
pub struct StageContext<'a> {
    pub project: &'a Project,
    pub channel: &'a ChannelProfile,
    pub ports: &'a Ports,
    pub config: &'a WorkerConfig,
    pub budget: &'a Budget,
    pub logger: &'a ProjectLogger,
}

/// Dispatch the claimed project to its stage processor.
pub async fn run_stage(ctx: &StageContext<'_>) -> StageDelta {
    match ctx.project.pipeline_stage {
        PipelineStage::Scripting => scripting::run(ctx).await,
        PipelineStage::Audio => audio::run(ctx).await,
        PipelineStage::Visuals => visuals::run(ctx).await,
        PipelineStage::Thumbnail => thumbnail::run(ctx).await,
        PipelineStage::Merging => merging::run(ctx).await,
        PipelineStage::Review => review::run(ctx).await,
        PipelineStage::Ready => StageDelta::unchanged(),
    }
}

/// Digest identifying one notification, for dedup across invocations.
pub(crate) fn notification_digest(
    stage: PipelineStage,
    kind: NotificationKind,
    message: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.as_bytes());
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(hasher.finalize())
}

/// Emit a notification unless the identical one was already sent for this
/// stage. Records the dedup digest on the delta when emitting.
pub(crate) async fn notify_once(
    ctx: &StageContext<'_>,
    delta: &mut StageDelta,
    kind: NotificationKind,
    message: &str,
) {
    let digest = notification_digest(ctx.project.pipeline_stage, kind, message);
    if ctx.project.last_notified_digest.as_deref() == Some(digest.as_str()) {
        debug!(
            project_id = %ctx.project.project_id,
            kind = %kind,
            "Suppressing duplicate notification"
        );
        return;
    }

    let metadata = serde_json::json!({
        "project_id": ctx.project.project_id,
        "stage": ctx.project.pipeline_stage.as_str(),
    });
    ctx.ports
        .notifier
        .emit(&ctx.project.channel_id, kind, message, metadata)
        .await;
    delta.last_notified_digest = Some(Some(digest));
}

/// Record a single stage advance, clearing the error and the notification
/// dedup digest for the new stage.
pub(crate) fn advance_to(delta: &mut StageDelta, next: PipelineStage) {
    delta.stage = Some(next);
    delta.last_error = Some(None);
    delta.last_notified_digest = Some(None);
}

/// Mark the project terminally failed and notify the operator.
pub(crate) async fn fail_project(ctx: &StageContext<'_>, delta: &mut StageDelta, message: &str) {
    ctx.logger.log_error(message);
    delta.status = Some(ProjectStatus::Failed);
    delta.last_error = Some(Some(message.to_string()));
    delta.log(ctx.project.pipeline_stage, message);
    notify_once(ctx, delta, NotificationKind::StageError, message).await;
}

/// Record a stage failure that a future invocation will retry.
pub(crate) async fn hold_with_error(ctx: &StageContext<'_>, delta: &mut StageDelta, message: &str) {
    ctx.logger.log_warning(message);
    delta.last_error = Some(Some(message.to_string()));
    delta.log(ctx.project.pipeline_stage, message);
    notify_once(ctx, delta, NotificationKind::StageError, message).await;
}

/// Shared post-processing for the scene-parallel stages.
///
/// Advances to `next` once every scene is terminal, resetting sub-state
/// bookkeeping on done scenes when the next stage is also scene-parallel.
/// If every scene is permanently skipped the project fails.
pub(crate) async fn settle_scene_stage(
    ctx: &StageContext<'_>,
    mut delta: StageDelta,
    scenes: Vec<Scene>,
    advance: SceneAdvance,
    next: PipelineStage,
    reset_for_next: bool,
) -> StageDelta {
    let stage = ctx.project.pipeline_stage;
    let max_retries = ctx.config.max_scene_retries;

    for (index, error) in &advance.failed {
        delta.log(stage, format!("Scene {} attempt failed: {}", index, error));
    }
    if advance.completed > 0 {
        ctx.logger
            .log_progress(&format!("{} scene(s) completed", advance.completed));
    }

    if !all_terminal(&scenes, max_retries) {
        // Partial progress only; hold at this stage
        if advance.attempted > 0 {
            delta.scenes = Some(scenes);
        }
        if !advance.failed.is_empty() {
            let message = format!(
                "{} scene attempt(s) failed at the {} stage",
                advance.failed.len(),
                stage
            );
            hold_with_error(ctx, &mut delta, &message).await;
        }
        return delta;
    }

    let done = scenes.iter().filter(|s| s.is_done()).count();
    if done == 0 {
        delta.scenes = Some(scenes);
        let message = format!("All scenes failed at the {} stage", stage);
        fail_project(ctx, &mut delta, &message).await;
        return delta;
    }

    let skipped = skipped_indexes(&scenes, max_retries);
    if !skipped.is_empty() {
        delta.log(
            stage,
            format!("Proceeding without {} exhausted scene(s): {:?}", skipped.len(), skipped),
        );
    }

    let mut scenes = scenes;
    if reset_for_next {
        for scene in scenes.iter_mut().filter(|s| s.is_done()) {
            scene.reset_for_stage();
        }
    }
    delta.scenes = Some(scenes);
    delta.log(stage, format!("Stage complete, advancing to {}", next));
    advance_to(&mut delta, next);
    ctx.logger
        .log_completion(&format!("{} done scene(s), advancing to {}", done, next));
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_distinguishes() {
        let a = notification_digest(
            PipelineStage::Review,
            NotificationKind::ApprovalNeeded,
            "ready for review",
        );
        let b = notification_digest(
            PipelineStage::Review,
            NotificationKind::ApprovalNeeded,
            "ready for review",
        );
        assert_eq!(a, b);

        let c = notification_digest(
            PipelineStage::Review,
            NotificationKind::StageError,
            "ready for review",
        );
        assert_ne!(a, c);

        let d = notification_digest(
            PipelineStage::Merging,
            NotificationKind::ApprovalNeeded,
            "ready for review",
        );
        assert_ne!(a, d);
    }
}
