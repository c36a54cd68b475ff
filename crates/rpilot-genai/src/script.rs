//! Gemini-backed script generation.
//!
//! Calls the generateContent endpoint in JSON mode and pins the reply to the
//! strict `ScriptResponse` schema. Anything malformed is a schema error the
//! engine treats as a retryable stage failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rpilot_models::{ChannelProfile, ScriptResponse};

use crate::error::{GenAiError, GenAiResult};
use crate::ports::ScriptGenerator;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini script generation client.
pub struct GeminiScriptGenerator {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

impl GeminiScriptGenerator {
    /// Create a new client from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GenAiError::config("GEMINI_API_KEY not set"))?;
        let model = std::env::var("SCRIPT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, model, DEFAULT_BASE_URL))
    }

    /// Create a client against a specific endpoint (used by tests).
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    fn build_prompt(&self, channel: &ChannelProfile, title: &str) -> String {
        format!(
            r#"You write scripts for short-form faceless videos.

Channel niche: {niche}
Tone: {tone}
Audience: {audience}
Video title: {title}

Return ONLY a single JSON object with this schema:
{{
  "script": "full narration script",
  "scenes": [
    {{
      "visual_prompt": "one-sentence visual description for a video generator",
      "narration_text": "the narration spoken over this scene"
    }}
  ]
}}

Additional instructions:
- Produce 3 to 8 scenes.
- Every scene must have a non-empty visual_prompt and narration_text.
- The concatenated narration_text fields must equal the script.
"#,
            niche = channel.niche,
            tone = channel.tone,
            audience = channel.audience,
            title = title,
        )
    }

    async fn call_api(&self, prompt: &str) -> GenAiResult<ScriptResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::Provider { status, body });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::schema(format!("unparseable provider envelope: {}", e)))?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| GenAiError::schema("no content in provider response"))?;

        let parsed: ScriptResponse = serde_json::from_str(strip_code_fences(text))
            .map_err(|e| GenAiError::schema(format!("script JSON did not parse: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| GenAiError::schema(e.to_string()))?;

        Ok(parsed)
    }
}

/// Strip markdown code fences some models wrap around JSON output.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[async_trait]
impl ScriptGenerator for GeminiScriptGenerator {
    async fn generate(&self, channel: &ChannelProfile, title: &str) -> GenAiResult<ScriptResponse> {
        debug!(channel_id = %channel.channel_id, title = %title, "Generating script");

        let prompt = self.build_prompt(channel, title);
        let response = self.call_api(&prompt).await?;

        info!(
            channel_id = %channel.channel_id,
            scenes = response.scenes.len(),
            "Script generated"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_channel() -> ChannelProfile {
        serde_json::from_value(json!({
            "channel_id": "c1",
            "niche": "history",
            "voice_id": "v1"
        }))
        .unwrap()
    }

    fn gemini_body(inner: &str) -> serde_json::Value {
        json!({
            "candidates": [
                {"content": {"parts": [{"text": inner}]}}
            ]
        })
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_generate_parses_valid_response() {
        let server = MockServer::start().await;
        let inner = r#"{"script":"hello world","scenes":[{"visual_prompt":"p","narration_text":"hello world"}]}"#;

        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(inner)))
            .mount(&server)
            .await;

        let client = GeminiScriptGenerator::new("key", "test-model", server.uri());
        let resp = client.generate(&test_channel(), "A Title").await.unwrap();
        assert_eq!(resp.scenes.len(), 1);
        assert_eq!(resp.script, "hello world");
    }

    #[tokio::test]
    async fn test_generate_rejects_schema_violation() {
        let server = MockServer::start().await;
        // Empty scene list violates the schema
        let inner = r#"{"script":"hello","scenes":[]}"#;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(inner)))
            .mount(&server)
            .await;

        let client = GeminiScriptGenerator::new("key", "test-model", server.uri());
        let err = client.generate(&test_channel(), "A Title").await.unwrap_err();
        assert!(matches!(err, GenAiError::Schema(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_generate_maps_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = GeminiScriptGenerator::new("key", "test-model", server.uri());
        let err = client.generate(&test_channel(), "A Title").await.unwrap_err();
        assert!(matches!(err, GenAiError::Provider { status: 503, .. }));
    }
}
