//! Review stage: hold for approval, then hand off to the publisher.

use rpilot_models::{NotificationKind, PipelineStage, ProjectStatus, StageDelta};

use crate::retry::{run_with_retry, RetryResult};
use crate::stages::{advance_to, fail_project, hold_with_error, notify_once, StageContext};

pub async fn run(ctx: &StageContext<'_>) -> StageDelta {
    let mut delta = StageDelta::unchanged();

    let approved = ctx.project.approved || ctx.channel.auto_publish();
    if !approved {
        let message = format!("\"{}\" is ready for review", ctx.project.title);
        notify_once(ctx, &mut delta, NotificationKind::ApprovalNeeded, &message).await;
        ctx.logger.log_progress("Holding for approval");
        return delta;
    }

    // The publisher needs a live platform token; refresh it before hand-off
    // so the project never sits in ready with a dead credential.
    let result = run_with_retry(&ctx.config.retry, ctx.budget, "credential_refresh", || {
        ctx.ports.credentials.ensure_fresh(ctx.channel)
    })
    .await;

    match result {
        RetryResult::Success(_) => {
            delta.status = Some(ProjectStatus::Ready);
            delta.log(PipelineStage::Review, "Approved, handing off to publisher");
            advance_to(&mut delta, PipelineStage::Ready);
            let message = format!("\"{}\" completed the pipeline", ctx.project.title);
            notify_once(ctx, &mut delta, NotificationKind::PipelineComplete, &message).await;
            ctx.logger.log_completion("Pipeline complete");
        }
        RetryResult::Failed { error, attempts } => {
            let message = format!(
                "Credential refresh failed after {} attempt(s): {}",
                attempts, error
            );
            if error.is_retryable() {
                hold_with_error(ctx, &mut delta, &message).await;
            } else {
                fail_project(ctx, &mut delta, &message).await;
            }
        }
        RetryResult::OutOfBudget { .. } => {
            ctx.logger
                .log_warning("Invocation budget exhausted before credential refresh");
        }
    }

    delta
}
