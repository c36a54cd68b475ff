//! Visuals stage: synthesize scene video, one scene per invocation.

use async_trait::async_trait;

use rpilot_genai::{GenAiResult, VideoSynthesizer};
use rpilot_models::{PipelineStage, Scene, StageDelta};

use crate::scenes::{advance_scenes, SceneOperation};
use crate::stages::{fail_project, settle_scene_stage, StageContext};

/// Video generation dominates the invocation budget (submit plus poll), so
/// each invocation takes exactly one scene.
const SCENES_PER_INVOCATION: usize = 1;

struct VisualOp<'a> {
    video: &'a dyn VideoSynthesizer,
    aspect_ratio: &'a str,
}

#[async_trait]
impl SceneOperation for VisualOp<'_> {
    fn name(&self) -> &'static str {
        "scene_video"
    }

    async fn run(&self, scene: &Scene) -> GenAiResult<String> {
        self.video
            .synthesize(&scene.visual_prompt, self.aspect_ratio)
            .await
    }

    fn record(&self, scene: &mut Scene, artifact: String) {
        scene.video_ref = Some(artifact);
    }
}

pub async fn run(ctx: &StageContext<'_>) -> StageDelta {
    let mut delta = StageDelta::unchanged();

    let mut scenes = ctx.project.scenes.clone();
    if scenes.is_empty() {
        fail_project(ctx, &mut delta, "Visuals stage reached with no scenes").await;
        return delta;
    }

    let op = VisualOp {
        video: ctx.ports.video.as_ref(),
        aspect_ratio: &ctx.channel.aspect_ratio,
    };
    let advance = advance_scenes(
        &mut scenes,
        SCENES_PER_INVOCATION,
        ctx.config.max_scene_retries,
        &ctx.config.retry,
        ctx.budget,
        &op,
    )
    .await;

    // Thumbnail is not scene-parallel; keep the scene states for merging
    settle_scene_stage(ctx, delta, scenes, advance, PipelineStage::Thumbnail, false).await
}
