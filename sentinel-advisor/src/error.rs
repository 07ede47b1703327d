use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `sentinel-advisor` downstream of data acquisition.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum AdvisorError {
    #[error("AI request failed: {0}")]
    AiRequest(String),

    #[error("AI response invalid: {0}")]
    AiResponseInvalid(String),

    #[error("notification failed: {0}")]
    NotificationFailed(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("scheduler unavailable: {0}")]
    Scheduler(String),
}

impl AdvisorError {
    /// Short user-facing hint on how to recover from this error.
    pub fn remediation(&self) -> &str {
        match self {
            AdvisorError::AiRequest(_) => {
                "check the AI API key, model name and base URL in settings; market data from \
                this cycle is still shown"
            }
            AdvisorError::AiResponseInvalid(_) => {
                "the model did not return the expected recommendation structure; run again or \
                choose a different model, market data from this cycle is still shown"
            }
            AdvisorError::NotificationFailed(_) => {
                "check the webhook URL; the analysis itself completed and is shown"
            }
            AdvisorError::Settings(_) => "fix the settings file or environment overrides and restart",
            AdvisorError::Scheduler(_) => "the scheduler has stopped; restart the server",
        }
    }
}
