//! Audio stage: synthesize per-scene narration, a few scenes per invocation.

use async_trait::async_trait;

use rpilot_genai::{GenAiResult, VoiceSynthesizer};
use rpilot_models::{PipelineStage, Scene, StageDelta};

use crate::scenes::{advance_scenes, SceneOperation};
use crate::stages::{fail_project, settle_scene_stage, StageContext};

struct AudioOp<'a> {
    voice: &'a dyn VoiceSynthesizer,
    voice_id: &'a str,
}

#[async_trait]
impl SceneOperation for AudioOp<'_> {
    fn name(&self) -> &'static str {
        "scene_audio"
    }

    async fn run(&self, scene: &Scene) -> GenAiResult<String> {
        self.voice
            .synthesize(self.voice_id, &scene.narration_text)
            .await
    }

    fn record(&self, scene: &mut Scene, artifact: String) {
        scene.audio_ref = Some(artifact);
    }
}

pub async fn run(ctx: &StageContext<'_>) -> StageDelta {
    let mut delta = StageDelta::unchanged();

    let mut scenes = ctx.project.scenes.clone();
    if scenes.is_empty() {
        fail_project(ctx, &mut delta, "Audio stage reached with no scenes").await;
        return delta;
    }

    let op = AudioOp {
        voice: ctx.ports.voice.as_ref(),
        voice_id: &ctx.channel.voice_id,
    };
    let advance = advance_scenes(
        &mut scenes,
        ctx.config.audio_scene_cap,
        ctx.config.max_scene_retries,
        &ctx.config.retry,
        ctx.budget,
        &op,
    )
    .await;

    // Done scenes are reset so the visuals stage starts them fresh
    settle_scene_stage(ctx, delta, scenes, advance, PipelineStage::Visuals, true).await
}
