//! Error types for request construction, transport, and response classification.

use thiserror::Error;

/// Stable error kinds synthesized by the dispatcher itself.
///
/// The numeric [`code`](Self::code) and English [`description`](Self::description) are stable;
/// presentation layers are expected to map the kind to a localized string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestErrorCode {
    /// An HTTP response was received with a non-success status.
    RequestFailed,
    /// No well-formed HTTP response was received at all.
    InvalidResponseType,
    /// A task removal found no matching entry.
    NoRequestFound,
    /// Reserved. Nothing in this crate retries, so this is never raised.
    MaximumNumberOfRetries,
}

impl RequestErrorCode {
    /// Numeric code of this kind.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::RequestFailed => 1,
            Self::InvalidResponseType => 2,
            Self::NoRequestFound => 3,
            Self::MaximumNumberOfRetries => 4,
        }
    }

    /// Untranslated human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::RequestFailed => "Request Failed",
            Self::InvalidResponseType => "Content-Type returned was invalid",
            Self::NoRequestFound => "No Request to remove",
            Self::MaximumNumberOfRetries => "Maximum Number of retries reached",
        }
    }
}

impl std::fmt::Display for RequestErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors reported by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// A connection-level failure (DNS, TCP, TLS, I/O).
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The failure half of a classified response.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A locally synthesized failure.
    #[error("{0}")]
    Code(RequestErrorCode),

    /// A transport failure, passed through verbatim.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response claimed to be JSON but could not be decoded.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RequestError {
    /// The synthesized error kind, if this is not a transport or decode error.
    #[must_use]
    pub fn code(&self) -> Option<RequestErrorCode> {
        match self {
            Self::Code(code) => Some(*code),
            Self::Transport(_) | Self::Json(_) => None,
        }
    }
}

impl From<RequestErrorCode> for RequestError {
    fn from(code: RequestErrorCode) -> Self {
        Self::Code(code)
    }
}

/// Errors raised synchronously while constructing a request or configuring a dispatcher.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The URL string could not be parsed into a well-formed URL.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Why it did not parse.
        #[source]
        source: url::ParseError,
    },

    /// A header value contained bytes that are not allowed on the wire.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}
