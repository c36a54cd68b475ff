//! Thumbnail stage: one image generation call.

use rpilot_models::{PipelineStage, StageDelta};

use crate::retry::{run_with_retry, RetryResult};
use crate::stages::{advance_to, fail_project, hold_with_error, StageContext};

pub async fn run(ctx: &StageContext<'_>) -> StageDelta {
    let mut delta = StageDelta::unchanged();

    let result = run_with_retry(&ctx.config.retry, ctx.budget, "thumbnail_generate", || {
        ctx.ports
            .thumbnail
            .synthesize(&ctx.project.title, &ctx.channel.niche, &ctx.project.style)
    })
    .await;

    match result {
        RetryResult::Success(image_ref) => {
            delta.log(
                PipelineStage::Thumbnail,
                format!("Thumbnail generated: {}", image_ref),
            );
            ctx.logger.log_completion("Thumbnail generated");
            delta.thumbnail_ref = Some(image_ref);
            advance_to(&mut delta, PipelineStage::Merging);
        }
        RetryResult::Failed { error, attempts } => {
            let message = format!(
                "Thumbnail generation failed after {} attempt(s): {}",
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
                .log_warning("Invocation budget exhausted before the thumbnail completed");
        }
    }

    delta
}
