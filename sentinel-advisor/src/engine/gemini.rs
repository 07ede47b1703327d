use super::{ReasoningEngine, TEMPERATURE, require_api_key, status_error};
use crate::{
    error::AdvisorError,
    prompt::{SYSTEM_INSTRUCTION, user_message},
    recommendation::Recommendation,
};
use async_trait::async_trait;
use sentinel_data::MarketAggregate;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// [`ReasoningEngine`] backed by the Gemini `generateContent` endpoint.
#[derive(Debug)]
pub struct GeminiEngine {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEngine {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        model: String,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

impl GeminiRequest {
    fn new(user_message: String) -> Self {
        Self {
            system_instruction: GeminiContent::new(None, SYSTEM_INSTRUCTION.to_string()),
            contents: vec![GeminiContent::new(Some("user"), user_message)],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
                temperature: TEMPERATURE,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn new(role: Option<&str>, text: String) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart { text: Some(text) }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

/// ### Raw Payload Examples
/// ```json
/// {
///     "candidates": [{
///         "content": { "role": "model", "parts": [{ "text": "{\"sentiment\": ...}" }] },
///         "finishReason": "STOP"
///     }],
///     "promptFeedback": { "blockReason": "SAFETY" }
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String, AdvisorError> {
        if let Some(reason) = self.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(AdvisorError::AiResponseInvalid(format!(
                "prompt blocked: {reason}"
            )));
        }

        let text = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AdvisorError::AiResponseInvalid(
                "response contained no candidate text".to_string(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl ReasoningEngine for GeminiEngine {
    async fn analyze(&self, aggregate: &MarketAggregate) -> Result<Recommendation, AdvisorError> {
        require_api_key(self.name(), &self.api_key)?;

        let request = GeminiRequest::new(user_message(aggregate)?);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| AdvisorError::AiRequest(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AdvisorError::AiRequest(error.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        debug!(engine = self.name(), model = %self.model, bytes = body.len(), "inference response received");

        let text = serde_json::from_str::<GeminiResponse>(&body)
            .map_err(|error| AdvisorError::AiResponseInvalid(error.to_string()))?
            .into_text()?;

        Recommendation::parse(&text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_request_shape() {
        let actual = serde_json::to_value(GeminiRequest::new("snapshot".to_string())).unwrap();

        assert_eq!(actual["systemInstruction"]["parts"][0]["text"], SYSTEM_INSTRUCTION);
        assert!(actual["systemInstruction"].get("role").is_none());
        assert_eq!(actual["contents"][0]["role"], "user");
        assert_eq!(actual["contents"][0]["parts"][0]["text"], "snapshot");
        assert_eq!(
            actual["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_gemini_endpoint() {
        let engine = GeminiEngine::new(
            reqwest::Client::new(),
            "key".to_string(),
            "gemini-2.0-flash".to_string(),
            Some("https://proxy.example.com/v1beta/".to_string()),
        );

        assert_eq!(
            engine.endpoint(),
            "https://proxy.example.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_gemini_response_into_text() {
        struct TestCase {
            input: &'static str,
            expected: Result<&'static str, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: parts are concatenated
                input: r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#,
                expected: Ok(r#"{"a":1}"#),
            },
            TestCase {
                // TC1: blocked prompt
                input: r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#,
                expected: Err(()),
            },
            TestCase {
                // TC2: candidate without content
                input: r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#,
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<GeminiResponse>(test.input)
                .unwrap()
                .into_text();
            match (actual, test.expected) {
                (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "TC{} failed", index),
                (Err(AdvisorError::AiResponseInvalid(_)), Err(())) => {}
                (actual, expected) => {
                    panic!("TC{index} failed. \nActual: {actual:?}\nExpected: {expected:?}\n")
                }
            }
        }
    }
}
