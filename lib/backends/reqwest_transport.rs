//! Reqwest-based transport backend.

use std::time::Duration;

use tracing::debug;

use crate::classify::{RawCompletion, ResponseHead};
use crate::config::DispatcherConfig;
use crate::error::TransportError;
use crate::request::WireRequest;
use crate::transport::Transport;

/// A [`Transport`] backed by [`reqwest`].
///
/// Non-success statuses are not treated as errors; classification happens in the dispatcher.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a new `ReqwestTransport` with the given timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Create a `ReqwestTransport` honouring the timeout and user agent in `config`.
    #[must_use]
    pub fn from_config(config: &DispatcherConfig) -> Self {
        let mut builder = reqwest::Client::builder().timeout(config.timeout());
        if let Some(user_agent) = config.user_agent_header() {
            builder = builder.user_agent(user_agent);
        }
        Self {
            client: builder.build().unwrap_or_default(),
        }
    }

    /// Create a `ReqwestTransport` from an existing [`reqwest::Client`].
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from_config(&DispatcherConfig::default())
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: WireRequest) -> RawCompletion {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return RawCompletion::failed(map_reqwest_error(e)),
        };

        let head = ResponseHead {
            status: response.status(),
            headers: response.headers().clone(),
        };

        match response.bytes().await {
            Ok(body) => RawCompletion::received(head, body),
            Err(e) => {
                debug!(status = %head.status, error = %e, "failed to read response body");
                RawCompletion {
                    body: None,
                    head: Some(head),
                    error: Some(map_reqwest_error(e)),
                }
            }
        }
    }
}

/// Map a reqwest error to our [`TransportError`].
fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(Box::new(err))
    }
}
