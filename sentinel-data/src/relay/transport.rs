use crate::error::{DataError, FetchFailure};
use async_trait::async_trait;
use std::time::Duration;

/// Raw HTTP response handed back to the [`RelayFetcher`](super::RelayFetcher).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a single HTTP GET. Implementations must abort the in-flight request once `timeout`
/// elapses and report it as [`FetchFailure::Timeout`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, FetchFailure>;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, DataError> {
        reqwest::Client::builder()
            .user_agent(concat!("sentinel-data/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(Self::from)
            .map_err(|error| DataError::Config(format!("failed to build HTTP client: {error}")))
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, FetchFailure> {
        let map_error = |error: reqwest::Error| {
            if error.is_timeout() {
                FetchFailure::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                FetchFailure::Transport(error.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_error)?;

        Ok(TransportResponse { status, body })
    }
}
