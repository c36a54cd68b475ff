//! Merging stage: build the deterministic merge manifest.
//!
//! No provider calls; the manifest is pure bookkeeping handed to the
//! downstream renderer. Scenes missing either artifact are listed as
//! skipped so the renderer and the operator can see the gaps.

use serde::{Deserialize, Serialize};

use rpilot_models::{PipelineStage, Project, StageDelta};

use crate::stages::{advance_to, fail_project, StageContext};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeManifest {
    pub version: u32,
    pub scenes: Vec<ManifestScene>,
    pub skipped: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestScene {
    pub index: u32,
    pub audio_ref: String,
    pub video_ref: String,
}

/// Build the manifest from the project's scene artifacts, index order.
pub fn build_manifest(project: &Project) -> MergeManifest {
    let mut ordered = project.scenes.clone();
    ordered.sort_by_key(|s| s.index);

    let mut scenes = Vec::new();
    let mut skipped = Vec::new();
    for scene in &ordered {
        match (&scene.audio_ref, &scene.video_ref) {
            (Some(audio_ref), Some(video_ref)) => scenes.push(ManifestScene {
                index: scene.index,
                audio_ref: audio_ref.clone(),
                video_ref: video_ref.clone(),
            }),
            _ => skipped.push(scene.index),
        }
    }

    MergeManifest {
        version: MANIFEST_VERSION,
        scenes,
        skipped,
        thumbnail_ref: project.thumbnail_ref.clone(),
    }
}

pub async fn run(ctx: &StageContext<'_>) -> StageDelta {
    let mut delta = StageDelta::unchanged();

    let manifest = build_manifest(ctx.project);
    if manifest.scenes.is_empty() {
        fail_project(ctx, &mut delta, "No scene has both artifacts to merge").await;
        return delta;
    }

    match serde_json::to_string(&manifest) {
        Ok(json) => {
            delta.log(
                PipelineStage::Merging,
                format!(
                    "Manifest built: {} scene(s), {} skipped",
                    manifest.scenes.len(),
                    manifest.skipped.len()
                ),
            );
            ctx.logger.log_completion(&format!(
                "Manifest built with {} scene(s)",
                manifest.scenes.len()
            ));
            delta.merge_manifest = Some(json);
            advance_to(&mut delta, PipelineStage::Review);
        }
        Err(e) => {
            fail_project(ctx, &mut delta, &format!("Manifest serialization failed: {}", e)).await;
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpilot_models::Scene;

    fn project_with_scenes(scenes: Vec<Scene>) -> Project {
        let mut project = Project::new("c1", "Title", "history");
        project.scenes = scenes;
        project.thumbnail_ref = Some("thumbs/t.png".to_string());
        project
    }

    fn done_scene(index: u32) -> Scene {
        let mut scene = Scene::new(index, "p", "n");
        scene.audio_ref = Some(format!("audio/{}.mp3", index));
        scene.video_ref = Some(format!("video/{}.mp4", index));
        scene
    }

    #[test]
    fn test_manifest_orders_by_index_and_skips_gaps() {
        let mut partial = Scene::new(1, "p", "n");
        partial.audio_ref = Some("audio/1.mp3".to_string());

        // Out of order on purpose
        let project = project_with_scenes(vec![done_scene(2), partial, done_scene(0)]);
        let manifest = build_manifest(&project);

        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(
            manifest.scenes.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(manifest.skipped, vec![1]);
        assert_eq!(manifest.thumbnail_ref.as_deref(), Some("thumbs/t.png"));
    }

    #[test]
    fn test_manifest_serialization_is_deterministic() {
        let project = project_with_scenes(vec![done_scene(0), done_scene(1)]);
        let a = serde_json::to_string(&build_manifest(&project)).unwrap();
        let b = serde_json::to_string(&build_manifest(&project)).unwrap();
        assert_eq!(a, b);

        let parsed: MergeManifest = serde_json::from_str(&a).unwrap();
        assert_eq!(parsed, build_manifest(&project));
    }
}
