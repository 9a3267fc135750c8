//! Turning raw transport output into a typed outcome.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::encoding::JSON_MIME;
use crate::error::{RequestError, RequestErrorCode, TransportError};

/// Status line and headers of a received HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// A head with the given status and no headers.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Whether the status is in `[200, 400)`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// Whether the `Content-Type` header mentions JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.contains(JSON_MIME))
    }
}

/// Everything a transport reports about one request. Any combination of fields may be present.
#[derive(Debug, Default)]
pub struct RawCompletion {
    /// The response body, if any bytes were read.
    pub body: Option<Bytes>,
    /// The response head, if an HTTP response was received.
    pub head: Option<ResponseHead>,
    /// A transport-level failure.
    pub error: Option<TransportError>,
}

impl RawCompletion {
    /// A fully received response.
    #[must_use]
    pub fn received(head: ResponseHead, body: Bytes) -> Self {
        Self {
            body: Some(body),
            head: Some(head),
            error: None,
        }
    }

    /// A request that failed before any response arrived.
    #[must_use]
    pub fn failed(error: TransportError) -> Self {
        Self {
            body: None,
            head: None,
            error: Some(error),
        }
    }
}

/// The decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A parsed JSON document.
    Json(Value),
    /// The request succeeded but there was nothing JSON-decodable in the response.
    Empty,
}

impl Body {
    /// The JSON document, if there is one.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Empty => None,
        }
    }
}

/// What a caller receives once a request has been classified.
#[derive(Debug)]
pub struct Completion {
    /// The outcome.
    pub result: Result<Body, RequestError>,
    /// Status and headers, when an HTTP response was received.
    pub head: Option<ResponseHead>,
    /// The raw response body, kept on failures too so error payloads can be inspected.
    pub body: Option<Bytes>,
}

impl Completion {
    /// A completion carrying only a synthesized failure.
    #[must_use]
    pub fn failed(code: RequestErrorCode) -> Self {
        Self {
            result: Err(RequestError::Code(code)),
            head: None,
            body: None,
        }
    }

    /// The body parsed as JSON, if the response was JSON-typed and parses. Works for failed
    /// requests as well, where servers often describe the error in the payload.
    #[must_use]
    pub fn json_body(&self) -> Option<Value> {
        let head = self.head.as_ref()?;
        if !head.is_json() {
            return None;
        }
        serde_json::from_slice(self.body.as_ref()?).ok()
    }
}

/// Whether `status` counts as success: `[200, 400)`.
#[must_use]
pub fn is_success_status(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

/// Classify a raw transport result.
///
/// First match wins:
/// 1. A response with a non-success status fails with the transport error, else `RequestFailed`.
/// 2. JSON-typed bytes that parse succeed with the parsed value.
/// 3. A successful response with no transport error and no decode error succeeds empty.
/// 4. Otherwise fail with the transport error, else the decode error, else `RequestFailed`
///    (or `InvalidResponseType` when no HTTP response arrived at all).
#[must_use]
pub fn classify(raw: RawCompletion) -> Completion {
    let RawCompletion { body, head, error } = raw;
    let result = resolve(body.as_ref(), head.as_ref(), error);
    Completion { result, head, body }
}

fn resolve(
    body: Option<&Bytes>,
    head: Option<&ResponseHead>,
    error: Option<TransportError>,
) -> Result<Body, RequestError> {
    if let Some(head) = head {
        if !head.is_success() {
            return Err(error.map_or(
                RequestError::Code(RequestErrorCode::RequestFailed),
                RequestError::Transport,
            ));
        }
    }

    let mut json_error = None;
    if let (Some(bytes), Some(head)) = (body, head) {
        if head.is_json() {
            match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => return Ok(Body::Json(value)),
                Err(e) => json_error = Some(e),
            }
        }
    }

    if head.is_some() && error.is_none() && json_error.is_none() {
        return Ok(Body::Empty);
    }

    if let Some(error) = error {
        return Err(RequestError::Transport(error));
    }
    if let Some(json_error) = json_error {
        return Err(RequestError::Json(json_error));
    }
    let code = if head.is_some() {
        RequestErrorCode::RequestFailed
    } else {
        RequestErrorCode::InvalidResponseType
    };
    Err(RequestError::Code(code))
}
