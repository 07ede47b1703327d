use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remediation text surfaced to users when every relay attempt for an upstream call failed.
pub const RELAY_GUIDANCE: &str = "\
    check network connectivity, disable VPN or ad-block filters that may block the public \
    relays, or add a working relay to the pool; the cycle can be re-run once connectivity \
    is restored";

/// Failure of a single relay attempt. Every variant is retryable within the attempt budget.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FetchFailure {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("relay responded with HTTP status {0}")]
    HttpStatus(u16),

    #[error("relay returned a non-JSON body: {0}")]
    NonJsonBody(String),

    #[error("response body is not valid JSON: {0}")]
    InvalidJson(String),

    /// The exchange embedded its own error code in an otherwise well-formed payload. Often
    /// indicates rate limiting.
    #[error("upstream API error {code}: {message}")]
    UpstreamApi { code: i64, message: String },
}

/// All errors generated in `sentinel-data`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error(
        "\
        RelayExhausted: all {attempts} relay attempts failed for {path}, last failure: {last}. \
        Remediation: {guidance}\
    "
    )]
    RelayExhausted {
        path: String,
        attempts: u32,
        last: FetchFailure,
        guidance: String,
    },

    #[error("malformed upstream payload: {0}")]
    MalformedUpstreamPayload(String),

    #[error("invalid acquisition configuration: {0}")]
    Config(String),
}

impl DataError {
    /// Construct a [`DataError::RelayExhausted`] annotated with the default remediation text.
    pub fn relay_exhausted(path: impl Into<String>, attempts: u32, last: FetchFailure) -> Self {
        Self::RelayExhausted {
            path: path.into(),
            attempts,
            last,
            guidance: RELAY_GUIDANCE.to_string(),
        }
    }

    /// Determine if re-running the whole acquisition cycle later may succeed.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::RelayExhausted { .. } => true,
            _ => false,
        }
    }

    /// Determine if the exchange itself rejected the last attempt (eg/ rate limiting).
    pub fn is_upstream_api_error(&self) -> bool {
        matches!(
            self,
            DataError::RelayExhausted {
                last: FetchFailure::UpstreamApi { .. },
                ..
            }
        )
    }

    /// Short user-facing hint on how to recover from this error.
    pub fn remediation(&self) -> &str {
        match self {
            DataError::RelayExhausted { guidance, .. } => guidance,
            DataError::MalformedUpstreamPayload(_) => {
                "the exchange returned data in an unexpected shape; the upstream API may have \
                changed, retrying will not help until the normaliser is updated"
            }
            DataError::Config(_) => "fix the acquisition settings and run again",
        }
    }
}
