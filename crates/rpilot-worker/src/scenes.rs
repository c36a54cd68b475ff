//! Scene-parallel stage driver.
//!
//! The audio and visuals stages both walk the scene list in index order,
//! advancing a bounded number of non-terminal scenes per invocation. A scene
//! that keeps failing hits its retry cap and is permanently skipped without
//! blocking its siblings.

use async_trait::async_trait;
use tracing::{info, warn};

use rpilot_genai::GenAiResult;
use rpilot_models::{Scene, SceneState};

use crate::retry::{run_with_retry, Budget, RetryConfig, RetryResult};

/// One stage's per-scene generation operation.
#[async_trait]
pub trait SceneOperation: Send + Sync {
    /// Operation name for logs.
    fn name(&self) -> &'static str;

    /// Produce the artifact for one scene.
    async fn run(&self, scene: &Scene) -> GenAiResult<String>;

    /// Store the produced artifact on the scene.
    fn record(&self, scene: &mut Scene, artifact: String);
}

/// What one invocation did to a scene list.
#[derive(Debug, Default)]
pub struct SceneAdvance {
    /// Scenes an attempt was started for
    pub attempted: usize,
    /// Scenes that reached `Done` this invocation
    pub completed: usize,
    /// Scene index and error message for each failed attempt
    pub failed: Vec<(u32, String)>,
    /// The budget ran out before the cap was reached
    pub out_of_budget: bool,
}

/// Advance up to `cap` non-terminal scenes through `op`, oldest index first.
///
/// Scene bookkeeping: success marks the scene `Done`; terminal failure of
/// the in-invocation attempts marks it `Failed` and spends one persistent
/// retry; running out of budget leaves the scene untouched so a later
/// invocation can retry it for free.
pub async fn advance_scenes(
    scenes: &mut [Scene],
    cap: usize,
    max_retries: u32,
    retry: &RetryConfig,
    budget: &Budget,
    op: &dyn SceneOperation,
) -> SceneAdvance {
    let mut advance = SceneAdvance::default();

    for scene in scenes.iter_mut() {
        if advance.attempted >= cap {
            break;
        }
        if scene.is_terminal(max_retries) {
            continue;
        }
        if budget.is_exhausted() {
            advance.out_of_budget = true;
            break;
        }

        advance.attempted += 1;
        let was_failed = scene.sub_state == SceneState::Failed;
        scene.sub_state = SceneState::InProgress;

        let result = {
            let scene_ref: &Scene = scene;
            run_with_retry(retry, budget, op.name(), || op.run(scene_ref)).await
        };
        match result {
            RetryResult::Success(artifact) => {
                op.record(scene, artifact);
                scene.sub_state = SceneState::Done;
                advance.completed += 1;
                info!(scene = scene.index, operation = op.name(), "Scene completed");
            }
            RetryResult::Failed { error, attempts } => {
                scene.sub_state = SceneState::Failed;
                scene.retry_count += 1;
                warn!(
                    scene = scene.index,
                    operation = op.name(),
                    attempts,
                    retry_count = scene.retry_count,
                    "Scene failed: {}",
                    error
                );
                advance.failed.push((scene.index, error.to_string()));
            }
            RetryResult::OutOfBudget { .. } => {
                // No persistent retry spent: time ran out, not attempts
                scene.sub_state = if was_failed {
                    SceneState::Failed
                } else {
                    SceneState::Pending
                };
                advance.out_of_budget = true;
                break;
            }
        }
    }

    advance
}

/// The stage is scene-complete: every scene is done or permanently skipped.
pub fn all_terminal(scenes: &[Scene], max_retries: u32) -> bool {
    !scenes.is_empty() && scenes.iter().all(|s| s.is_terminal(max_retries))
}

/// Indexes of scenes permanently skipped at their retry cap.
pub fn skipped_indexes(scenes: &[Scene], max_retries: u32) -> Vec<u32> {
    scenes
        .iter()
        .filter(|s| s.is_retry_exhausted(max_retries))
        .map(|s| s.index)
        .collect()
}
