//! Proxy-rotating fetcher.
//!
//! Retrieves one JSON resource from a fixed upstream REST base URL by relaying the request
//! through an unreliable, interchangeable pool of public forwarding services.
//!
//! Each call owns an attempt budget: attempt `i` (for `i` in `0..=max_attempts`) goes through
//! relay `i mod relays.len()`, waits `backoff_base * i + jitter` beforehand when `i > 0`, and is
//! bounded by the request timeout. Any HTTP failure status, HTML error page, unparseable body or
//! exchange-embedded error code is a retryable [`FetchFailure`]. The first successful attempt
//! short-circuits with the payload's data portion; exhausting the budget yields
//! [`DataError::RelayExhausted`] carrying the last failure.

use crate::error::{DataError, FetchFailure};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// HTTP [`Transport`] abstraction and its reqwest implementation.
pub mod transport;

pub use transport::{ReqwestTransport, Transport, TransportResponse};

/// Public forwarding services used by default. Each accepts a percent-encoded absolute URL
/// appended to its base.
pub const DEFAULT_RELAYS: [&str; 3] = [
    "https://corsproxy.io/?url=",
    "https://api.allorigins.win/raw?url=",
    "https://api.codetabs.com/v1/proxy?quest=",
];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MIN_TIMEOUT: Duration = Duration::from_secs(8);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_JITTER: Duration = Duration::from_millis(500);

const BODY_SNIPPET_CHARS: usize = 80;

/// A route to the upstream API.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relay {
    /// Forwarding service: request URL is `base + percent_encode(target)`.
    Forward { base: String },
    /// Request the upstream directly, for processes not subject to cross-origin restrictions.
    Direct,
}

impl Relay {
    pub fn forward(base: impl Into<String>) -> Self {
        Self::Forward { base: base.into() }
    }

    /// Construct the URL to request for the absolute upstream `target`.
    pub fn request_url(&self, target: &Url) -> String {
        match self {
            Relay::Forward { base } => {
                let encoded = url::form_urlencoded::byte_serialize(target.as_str().as_bytes())
                    .collect::<String>();
                format!("{base}{encoded}")
            }
            Relay::Direct => target.to_string(),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Relay::Forward { base } => base,
            Relay::Direct => "direct",
        }
    }
}

/// [`RelayFetcher`] configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub relays: Vec<Relay>,
    /// Retries after the first attempt, ie/ `max_attempts + 1` attempts in total.
    pub max_attempts: u32,
    /// Always within `[MIN_TIMEOUT, MAX_TIMEOUT]`, see [`RelayConfig::with_timeout`].
    timeout: Duration,
    pub backoff_base: Duration,
    /// Upper bound of the uniformly random delay added to each backoff.
    pub backoff_jitter: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.into_iter().map(Relay::forward).collect(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl RelayConfig {
    /// Replace the relay pool.
    pub fn with_relays(mut self, relays: Vec<Relay>) -> Self {
        self.relays = relays;
        self
    }

    /// Set the retry budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the per-request timeout, clamped to `[MIN_TIMEOUT, MAX_TIMEOUT]`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the backoff base delay and jitter bound.
    pub fn with_backoff(mut self, base: Duration, jitter: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_jitter = jitter;
        self
    }
}

/// Exchange-specific payload envelope.
///
/// Upstream APIs often answer HTTP 200 with an embedded status code; implementations reject
/// those with [`FetchFailure::UpstreamApi`] and return the data portion otherwise.
pub trait UpstreamEnvelope: Send + Sync {
    fn unwrap_payload(&self, payload: Value) -> Result<Value, FetchFailure>;
}

/// Outcome of [`retry_decision`].
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RetryDecision {
    Retry,
    Abort,
}

/// Decide whether the failed `attempt` (0-indexed) should be followed by another.
pub fn retry_decision(failure: &FetchFailure, attempt: u32, max_attempts: u32) -> RetryDecision {
    if attempt >= max_attempts {
        return RetryDecision::Abort;
    }

    match failure {
        FetchFailure::Timeout { .. }
        | FetchFailure::Transport(_)
        | FetchFailure::HttpStatus(_)
        | FetchFailure::NonJsonBody(_)
        | FetchFailure::InvalidJson(_)
        | FetchFailure::UpstreamApi { .. } => RetryDecision::Retry,
    }
}

/// Delay before `attempt`: zero for the first, otherwise `backoff_base * attempt` plus
/// `jitter` (capped at the configured bound).
pub fn backoff_delay(config: &RelayConfig, attempt: u32, jitter: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    config.backoff_base * attempt + jitter.min(config.backoff_jitter)
}

/// Pre-validate that a body looks like JSON before parsing it.
///
/// Relays sometimes answer with an HTML error page and a 200 status, which would otherwise
/// surface as a misleading parse error.
pub fn parse_json_body(body: &str) -> Result<Value, FetchFailure> {
    let trimmed = body.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Err(FetchFailure::NonJsonBody(
            trimmed.chars().take(BODY_SNIPPET_CHARS).collect(),
        ));
    }

    serde_json::from_str(trimmed).map_err(|error| FetchFailure::InvalidJson(error.to_string()))
}

/// Fetches upstream resources through the relay pool. See the [module docs](self).
#[derive(Debug)]
pub struct RelayFetcher<T, E> {
    transport: T,
    envelope: E,
    base_url: Url,
    config: RelayConfig,
}

impl<T, E> RelayFetcher<T, E>
where
    T: Transport,
    E: UpstreamEnvelope,
{
    pub fn new(transport: T, envelope: E, base_url: Url, config: RelayConfig) -> Self {
        Self {
            transport,
            envelope,
            base_url,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Fetch `path` (including query) relative to the upstream base URL with the configured
    /// attempt budget.
    pub async fn fetch_default(&self, path: &str) -> Result<Value, DataError> {
        self.fetch(path, self.config.max_attempts).await
    }

    /// Fetch `path` (including query) relative to the upstream base URL, making at most
    /// `max_attempts + 1` attempts.
    pub async fn fetch(&self, path: &str, max_attempts: u32) -> Result<Value, DataError> {
        if self.config.relays.is_empty() {
            return Err(DataError::Config("relay pool is empty".to_string()));
        }

        let target = self
            .base_url
            .join(path)
            .map_err(|error| DataError::Config(format!("invalid upstream path {path}: {error}")))?;

        let mut attempt = 0;
        loop {
            let relay = &self.config.relays[attempt as usize % self.config.relays.len()];

            if attempt > 0 {
                let jitter = random_jitter(self.config.backoff_jitter);
                let delay = backoff_delay(&self.config, attempt, jitter);
                debug!(%path, attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            let failure = match self.attempt(relay, &target).await {
                Ok(data) => {
                    if attempt > 0 {
                        info!(%path, attempt, relay = relay.name(), "relay fetch recovered");
                    }
                    return Ok(data);
                }
                Err(failure) => failure,
            };

            warn!(
                %path,
                attempt,
                relay = relay.name(),
                %failure,
                "relay attempt failed"
            );

            match retry_decision(&failure, attempt, max_attempts) {
                RetryDecision::Retry => attempt += 1,
                RetryDecision::Abort => {
                    return Err(DataError::relay_exhausted(path, attempt + 1, failure));
                }
            }
        }
    }

    async fn attempt(&self, relay: &Relay, target: &Url) -> Result<Value, FetchFailure> {
        let url = relay.request_url(target);
        let response = self.transport.get(&url, self.config.timeout).await?;

        if !response.is_success() {
            return Err(FetchFailure::HttpStatus(response.status));
        }

        let payload = parse_json_body(&response.body)?;
        self.envelope.unwrap_payload(payload)
    }
}

fn random_jitter(bound: Duration) -> Duration {
    let bound_ms = bound.as_millis() as u64;
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=bound_ms))
}
