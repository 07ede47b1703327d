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

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// [`ReasoningEngine`] for any OpenAI-compatible chat completions host.
#[derive(Debug)]
pub struct OpenAiEngine {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEngine {
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
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// ### Raw Payload Examples
/// ```json
/// {
///     "id": "chatcmpl-123",
///     "choices": [{
///         "index": 0,
///         "message": { "role": "assistant", "content": "{\"sentiment\": ...}" },
///         "finish_reason": "stop"
///     }]
/// }
/// ```
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, AdvisorError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                AdvisorError::AiResponseInvalid("response contained no message content".to_string())
            })
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn analyze(&self, aggregate: &MarketAggregate) -> Result<Recommendation, AdvisorError> {
        require_api_key(self.name(), &self.api_key)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::new("system", SYSTEM_INSTRUCTION.to_string()),
                ChatMessage::new("user", user_message(aggregate)?),
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
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

        let text = serde_json::from_str::<ChatResponse>(&body)
            .map_err(|error| AdvisorError::AiResponseInvalid(error.to_string()))?
            .into_text()?;

        Recommendation::parse(&text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "deepseek-chat",
            messages: vec![
                ChatMessage::new("system", "sys".to_string()),
                ChatMessage::new("user", "snapshot".to_string()),
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: TEMPERATURE,
        };

        let actual = serde_json::to_value(request).unwrap();

        assert_eq!(actual["model"], "deepseek-chat");
        assert_eq!(actual["messages"][0]["role"], "system");
        assert_eq!(actual["messages"][1]["content"], "snapshot");
        assert_eq!(actual["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_openai_endpoint_respects_base_url() {
        struct TestCase {
            input: Option<String>,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: default host
                input: None,
                expected: "https://api.openai.com/v1/chat/completions",
            },
            TestCase {
                // TC1: compatible host with trailing slash
                input: Some("https://api.deepseek.com/v1/".to_string()),
                expected: "https://api.deepseek.com/v1/chat/completions",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let engine = OpenAiEngine::new(
                reqwest::Client::new(),
                "key".to_string(),
                "gpt-4o-mini".to_string(),
                test.input,
            );
            assert_eq!(engine.endpoint(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_chat_response_into_text() {
        let ok = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"{}"},"finish_reason":"stop"}]}"#;
        assert_eq!(
            serde_json::from_str::<ChatResponse>(ok).unwrap().into_text().unwrap(),
            "{}"
        );

        let empty = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(matches!(
            serde_json::from_str::<ChatResponse>(empty).unwrap().into_text(),
            Err(AdvisorError::AiResponseInvalid(_))
        ));

        let none = r#"{"choices":[]}"#;
        assert!(matches!(
            serde_json::from_str::<ChatResponse>(none).unwrap().into_text(),
            Err(AdvisorError::AiResponseInvalid(_))
        ));
    }
}
