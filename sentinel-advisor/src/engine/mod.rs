use crate::{
    config::{EngineKind, Settings},
    error::AdvisorError,
    recommendation::Recommendation,
};
use async_trait::async_trait;
use sentinel_data::MarketAggregate;
use std::time::Duration;

/// Google Gemini `generateContent` engine.
pub mod gemini;

/// OpenAI-compatible `/chat/completions` engine.
pub mod openai;

pub use gemini::GeminiEngine;
pub use openai::OpenAiEngine;

/// Upper bound on a single inference call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling temperature applied to every engine.
pub const TEMPERATURE: f32 = 0.2;

/// Remote reasoning step: given a complete [`MarketAggregate`], return a validated
/// [`Recommendation`].
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn analyze(&self, aggregate: &MarketAggregate) -> Result<Recommendation, AdvisorError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Construct the [`ReasoningEngine`] selected in `settings`.
pub fn build_engine(settings: &Settings) -> Result<Box<dyn ReasoningEngine>, AdvisorError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|error| AdvisorError::Settings(format!("failed to build HTTP client: {error}")))?;

    let engine: Box<dyn ReasoningEngine> = match settings.engine {
        EngineKind::Gemini => Box::new(GeminiEngine::new(
            client,
            settings.api_key.clone(),
            settings.model().to_string(),
            settings.base_url.clone(),
        )),
        EngineKind::OpenAi => Box::new(OpenAiEngine::new(
            client,
            settings.api_key.clone(),
            settings.model().to_string(),
            settings.base_url.clone(),
        )),
    };

    Ok(engine)
}

/// Reject calls that can only fail upstream.
fn require_api_key(engine: &str, api_key: &str) -> Result<(), AdvisorError> {
    if api_key.trim().is_empty() {
        return Err(AdvisorError::AiRequest(format!(
            "no API key configured for {engine}"
        )));
    }
    Ok(())
}

/// Map a non-success HTTP response to [`AdvisorError::AiRequest`], keeping a short body excerpt.
fn status_error(status: reqwest::StatusCode, body: &str) -> AdvisorError {
    let excerpt = body.trim().chars().take(200).collect::<String>();
    AdvisorError::AiRequest(format!("HTTP {status}: {excerpt}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_engine_selects_backend() {
        struct TestCase {
            input: Settings,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: default engine
                input: Settings::default(),
                expected: "gemini",
            },
            TestCase {
                // TC1: OpenAI-compatible host
                input: Settings {
                    engine: EngineKind::OpenAi,
                    ..Default::default()
                },
                expected: "openai",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = build_engine(&test.input).unwrap();
            assert_eq!(actual.name(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_require_api_key() {
        assert!(require_api_key("gemini", "abc").is_ok());
        assert!(matches!(
            require_api_key("gemini", "  "),
            Err(AdvisorError::AiRequest(_))
        ));
    }

    #[test]
    fn test_status_error_truncates_body() {
        let body = "x".repeat(1000);
        let AdvisorError::AiRequest(message) =
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, &body)
        else {
            panic!("expected AiRequest");
        };

        assert!(message.starts_with("HTTP 429 Too Many Requests: "));
        assert!(message.len() < 300);
    }
}
