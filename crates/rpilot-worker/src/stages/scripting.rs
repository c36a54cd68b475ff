//! Scripting stage: generate the script and seed the scene list.

use rpilot_models::{PipelineStage, Scene, StageDelta};

use crate::retry::{run_with_retry, RetryResult};
use crate::stages::{advance_to, fail_project, hold_with_error, StageContext};

pub async fn run(ctx: &StageContext<'_>) -> StageDelta {
    let mut delta = StageDelta::unchanged();

    let result = run_with_retry(&ctx.config.retry, ctx.budget, "script_generate", || {
        ctx.ports.script.generate(ctx.channel, &ctx.project.title)
    })
    .await;

    match result {
        RetryResult::Success(script) => {
            let scenes: Vec<Scene> = script
                .scenes
                .iter()
                .enumerate()
                .map(|(i, prompt)| {
                    Scene::new(i as u32, &prompt.visual_prompt, &prompt.narration_text)
                })
                .collect();

            delta.log(
                PipelineStage::Scripting,
                format!("Generated script with {} scenes", scenes.len()),
            );
            ctx.logger
                .log_completion(&format!("Script generated, {} scenes", scenes.len()));
            delta.script = Some(script.script);
            delta.scenes = Some(scenes);
            advance_to(&mut delta, PipelineStage::Audio);
        }
        RetryResult::Failed { error, attempts } => {
            let message = format!(
                "Script generation failed after {} attempt(s): {}",
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
                .log_warning("Invocation budget exhausted before the script completed");
        }
    }

    delta
}
