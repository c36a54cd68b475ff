//! Scene models: per-scene sub-units of audio/video work.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sub-state of a single scene within the audio or visuals stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneState {
    /// Not yet attempted
    #[default]
    Pending,
    /// An attempt is underway in this invocation
    InProgress,
    /// Artifact produced; never re-attempted
    Done,
    /// Last attempt failed; eligible again until the retry cap
    Failed,
}

impl SceneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneState::Pending => "pending",
            SceneState::InProgress => "in_progress",
            SceneState::Done => "done",
            SceneState::Failed => "failed",
        }
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One short sub-segment of a project requiring independent generation.
///
/// `visual_prompt` and `narration_text` are written once by the scripting
/// stage and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Zero-based position within the project
    pub index: u32,

    /// Prompt for the video synthesis provider
    pub visual_prompt: String,

    /// Text for the voice synthesis provider
    pub narration_text: String,

    /// Narration audio reference, set by the audio stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,

    /// Scene video reference, set by the visuals stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,

    /// Sub-state within the current scene-parallel stage
    #[serde(default)]
    pub sub_state: SceneState,

    /// Attempts made for the currently failing operation on this scene
    #[serde(default)]
    pub retry_count: u32,
}

impl Scene {
    /// Create a fresh pending scene.
    pub fn new(
        index: u32,
        visual_prompt: impl Into<String>,
        narration_text: impl Into<String>,
    ) -> Self {
        Self {
            index,
            visual_prompt: visual_prompt.into(),
            narration_text: narration_text.into(),
            audio_ref: None,
            video_ref: None,
            sub_state: SceneState::Pending,
            retry_count: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.sub_state == SceneState::Done
    }

    /// A scene at the retry cap is permanently excluded from attempts but
    /// does not block its siblings.
    pub fn is_retry_exhausted(&self, max_retries: u32) -> bool {
        self.sub_state != SceneState::Done && self.retry_count >= max_retries
    }

    /// Done, or permanently excluded. The enclosing stage is scene-complete
    /// once every scene is terminal.
    pub fn is_terminal(&self, max_retries: u32) -> bool {
        self.is_done() || self.is_retry_exhausted(max_retries)
    }

    /// Reset sub-state bookkeeping when a new scene-parallel stage begins,
    /// keeping artifacts from the previous stage untouched.
    pub fn reset_for_stage(&mut self) {
        self.sub_state = SceneState::Pending;
        self.retry_count = 0;
    }
}
