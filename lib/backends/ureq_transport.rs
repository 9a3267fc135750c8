//! Ureq-based transport backend (blocking).
//!
//! Since ureq is a synchronous HTTP client, every request runs on tokio's blocking pool so the
//! worker threads driving other requests are never stalled.

use std::io::Read as _;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderValue;
use http::header::USER_AGENT;

use crate::classify::{RawCompletion, ResponseHead};
use crate::config::DispatcherConfig;
use crate::error::TransportError;
use crate::request::WireRequest;
use crate::transport::Transport;

/// A [`Transport`] backed by [`ureq`].
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    user_agent: Option<HeaderValue>,
}

impl UreqTransport {
    /// Create a new `UreqTransport` with the given timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            user_agent: None,
        }
    }

    /// Create a `UreqTransport` honouring the timeout and user agent in `config`.
    #[must_use]
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            agent: build_agent(config.timeout()),
            user_agent: config.user_agent_header(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::from_config(&DispatcherConfig::default())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        // Statuses are classified by the dispatcher, not treated as errors here.
        .http_status_as_error(false)
        .build()
        .new_agent()
}

impl Transport for UreqTransport {
    async fn send(&self, mut request: WireRequest) -> RawCompletion {
        if let Some(user_agent) = &self.user_agent {
            request
                .headers
                .entry(USER_AGENT)
                .or_insert_with(|| user_agent.clone());
        }

        let agent = self.agent.clone();
        match tokio::task::spawn_blocking(move || run_blocking(&agent, request)).await {
            Ok(raw) => raw,
            Err(e) => RawCompletion::failed(TransportError::Other(Box::new(e))),
        }
    }
}

fn run_blocking(agent: &ureq::Agent, request: WireRequest) -> RawCompletion {
    let mut builder = http::Request::builder()
        .method(request.method)
        .uri(request.url.as_str());

    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }

    let result = if let Some(body) = request.body {
        match builder.body(body.to_vec()) {
            Ok(req) => agent.run(req),
            Err(e) => return RawCompletion::failed(TransportError::Other(Box::new(e))),
        }
    } else {
        match builder.body(()) {
            Ok(req) => agent.run(req),
            Err(e) => return RawCompletion::failed(TransportError::Other(Box::new(e))),
        }
    };

    match result {
        Ok(response) => convert_response(response),
        Err(ureq::Error::Timeout(_)) => RawCompletion::failed(TransportError::Timeout),
        Err(ureq::Error::HostNotFound) => {
            RawCompletion::failed(TransportError::Connection("host not found".to_owned()))
        }
        Err(ureq::Error::Io(e)) => RawCompletion::failed(TransportError::Connection(e.to_string())),
        Err(e) => RawCompletion::failed(TransportError::Other(Box::new(e))),
    }
}

/// Convert a ureq `http::Response<Body>` into a [`RawCompletion`].
fn convert_response(response: http::Response<ureq::Body>) -> RawCompletion {
    let (parts, body) = response.into_parts();
    let head = ResponseHead {
        status: parts.status,
        headers: parts.headers,
    };

    let mut body_bytes = Vec::new();
    match body.into_reader().read_to_end(&mut body_bytes) {
        Ok(_) => RawCompletion::received(head, Bytes::from(body_bytes)),
        Err(e) => RawCompletion {
            body: None,
            head: Some(head),
            error: Some(TransportError::Connection(e.to_string())),
        },
    }
}
