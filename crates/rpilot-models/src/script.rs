//! Strict schema for the script-generation response.
//!
//! The AI provider returns free-form JSON; this module pins it to a schema
//! and rejects anything malformed so a bad response becomes a retryable
//! stage failure instead of a crash.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on scenes per project. Responses beyond this are rejected
/// rather than silently truncated.
pub const MAX_SCENES: usize = 20;

/// Schema violation in a script-generation response.
#[derive(Debug, Error, PartialEq)]
pub enum ScriptSchemaError {
    #[error("script text is empty")]
    EmptyScript,

    #[error("response contains no scenes")]
    NoScenes,

    #[error("response contains {0} scenes, maximum is {MAX_SCENES}")]
    TooManyScenes(usize),

    #[error("scene {0} has an empty visual prompt")]
    EmptyVisualPrompt(usize),

    #[error("scene {0} has empty narration text")]
    EmptyNarration(usize),
}

/// One scene prompt inside a script response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenePrompt {
    /// Prompt for the video synthesis provider
    pub visual_prompt: String,

    /// Text for the voice synthesis provider
    pub narration_text: String,
}

/// Structured script-generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptResponse {
    /// Full narration script
    pub script: String,

    /// Ordered scene prompts
    pub scenes: Vec<ScenePrompt>,
}

impl ScriptResponse {
    /// Validate the parsed response against the schema rules.
    pub fn validate(&self) -> Result<(), ScriptSchemaError> {
        if self.script.trim().is_empty() {
            return Err(ScriptSchemaError::EmptyScript);
        }
        if self.scenes.is_empty() {
            return Err(ScriptSchemaError::NoScenes);
        }
        if self.scenes.len() > MAX_SCENES {
            return Err(ScriptSchemaError::TooManyScenes(self.scenes.len()));
        }
        for (i, scene) in self.scenes.iter().enumerate() {
            if scene.visual_prompt.trim().is_empty() {
                return Err(ScriptSchemaError::EmptyVisualPrompt(i));
            }
            if scene.narration_text.trim().is_empty() {
                return Err(ScriptSchemaError::EmptyNarration(i));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_response() -> ScriptResponse {
        ScriptResponse {
            script: "Rome was not built in a day.".to_string(),
            scenes: vec![ScenePrompt {
                visual_prompt: "a roman forum at dawn".to_string(),
                narration_text: "Rome was not built in a day.".to_string(),
            }],
        }
    }

    #[test]
    fn test_valid_response_passes() {
        assert_eq!(valid_response().validate(), Ok(()));
    }

    #[test]
    fn test_empty_script_rejected() {
        let mut resp = valid_response();
        resp.script = "  ".to_string();
        assert_eq!(resp.validate(), Err(ScriptSchemaError::EmptyScript));
    }

    #[test]
    fn test_no_scenes_rejected() {
        let mut resp = valid_response();
        resp.scenes.clear();
        assert_eq!(resp.validate(), Err(ScriptSchemaError::NoScenes));
    }

    #[test]
    fn test_too_many_scenes_rejected() {
        let mut resp = valid_response();
        let scene = resp.scenes[0].clone();
        resp.scenes = vec![scene; MAX_SCENES + 1];
        assert_eq!(
            resp.validate(),
            Err(ScriptSchemaError::TooManyScenes(MAX_SCENES + 1))
        );
    }

    #[test]
    fn test_empty_scene_fields_rejected() {
        let mut resp = valid_response();
        resp.scenes[0].visual_prompt = String::new();
        assert_eq!(resp.validate(), Err(ScriptSchemaError::EmptyVisualPrompt(0)));

        let mut resp = valid_response();
        resp.scenes[0].narration_text = "\n".to_string();
        assert_eq!(resp.validate(), Err(ScriptSchemaError::EmptyNarration(0)));
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        // Providers add fields over time; parsing must not break on them.
        let json = r#"{
            "script": "text",
            "scenes": [{"visual_prompt": "p", "narration_text": "n", "mood": "epic"}],
            "model_version": "v2"
        }"#;
        let resp: ScriptResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.validate(), Ok(()));
    }
}
