use crate::{
    config::{Settings, WebhookFlavor},
    error::AdvisorError,
    recommendation::Recommendation,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Discord rejects `content` longer than this.
pub const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Delivers a formatted message to a chat channel.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), AdvisorError>;
}

/// [`Notify`] via a single webhook POST.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    flavor: WebhookFlavor,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String, flavor: WebhookFlavor) -> Self {
        Self { client, url, flavor }
    }

    /// Construct from `settings`, or `None` when no webhook is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| Self::new(reqwest::Client::new(), url.to_string(), settings.webhook_flavor))
    }
}

#[async_trait]
impl Notify for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), AdvisorError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload(self.flavor, message))
            .send()
            .await
            .map_err(|error| AdvisorError::NotificationFailed(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::NotificationFailed(format!(
                "webhook responded with HTTP {status}"
            )));
        }

        debug!(flavor = ?self.flavor, "webhook delivered");
        Ok(())
    }
}

/// JSON body for the webhook `flavor`.
pub fn payload(flavor: WebhookFlavor, message: &str) -> Value {
    match flavor {
        WebhookFlavor::Discord => {
            json!({ "content": message.chars().take(DISCORD_CONTENT_LIMIT).collect::<String>() })
        }
        WebhookFlavor::Slack => json!({ "text": message }),
    }
}

/// Human-readable summary of a recommendation at the latest price.
pub fn format_message(symbol: &str, price: f64, recommendation: &Recommendation) -> String {
    let strategy = &recommendation.strategy;
    format!(
        "{symbol} @ {price:.2} | {sentiment}\n\
        Action: {action} ({leverage})\n\
        Entry: {entry} | TP: {tp} | SL: {sl}\n\
        Valid: {validity}\n\n\
        {analysis}",
        sentiment = recommendation.sentiment,
        action = strategy.action,
        leverage = strategy.leverage,
        entry = strategy.entry,
        tp = strategy.tp,
        sl = strategy.sl,
        validity = strategy.validity,
        analysis = recommendation.analysis,
    )
}
