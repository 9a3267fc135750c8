//! Request descriptors and their wire-level translation.

use bytes::Bytes;
use http::Method;
use http::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::encoding::{
    ParamValue, Parameters, RequestEncoding, RequestHeader, ResponseEncoding,
    accept_header_value, encode_body, encode_query, form_urlencode,
};
use crate::error::BuildError;

/// The HTTP methods a [`Request`] may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// The method token as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether parameters travel in the body rather than the query string.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Patch)
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, declarative description of an HTTP request.
///
/// Built with [`Request::builder`]. The URL is validated when the descriptor is built, so a
/// descriptor that exists can always be translated into a [`WireRequest`].
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpMethod,
    url: Url,
    parameters: Option<Parameters>,
    request_encoding: RequestEncoding,
    response_encoding: ResponseEncoding,
    authorization_header: Option<HeaderValue>,
}

impl Request {
    /// Start describing a request to `url`.
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    /// A `GET` request to `url` with every other setting at its default.
    pub fn get(url: impl Into<String>) -> Result<Self, BuildError> {
        Self::builder(url).build()
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The target URL, without any parameters applied.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request parameters, if any.
    #[must_use]
    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    /// How parameters are encoded into a body.
    #[must_use]
    pub fn request_encoding(&self) -> RequestEncoding {
        self.request_encoding
    }

    /// The preferred response representation.
    #[must_use]
    pub fn response_encoding(&self) -> ResponseEncoding {
        self.response_encoding
    }

    /// The per-request `Authorization` value, if one was given.
    #[must_use]
    pub fn authorization_header(&self) -> Option<&HeaderValue> {
        self.authorization_header.as_ref()
    }

    /// Translate this descriptor into a transport-ready request.
    ///
    /// `GET` and `DELETE` carry their parameters in the query string and never have a body.
    /// `POST` and `PATCH` carry them in the body and leave the URL untouched. Query items are
    /// appended after any query already present in the URL.
    #[must_use]
    pub fn to_wire(&self) -> WireRequest {
        let mut url = self.url.clone();
        let body = if self.method.carries_body() {
            encode_body(self.parameters.as_ref(), self.request_encoding)
        } else {
            if let Some(parameters) = &self.parameters {
                let items = encode_query(parameters);
                if !items.is_empty() {
                    let encoded = form_urlencode(&items);
                    let query = match url.query() {
                        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
                        _ => encoded,
                    };
                    url.set_query(Some(&query));
                }
            }
            None
        };

        let mut wire = WireRequest {
            method: self.method.into(),
            url,
            headers: HeaderMap::new(),
            body,
        };

        if let Some(auth) = &self.authorization_header {
            wire.headers
                .insert(RequestHeader::Authorization.name(), auth.clone());
        }
        wire.headers.insert(
            self.request_encoding.header().name(),
            HeaderValue::from_static(self.request_encoding.mime()),
        );
        wire.headers.insert(
            self.response_encoding.header().name(),
            HeaderValue::from_static(accept_header_value(self.response_encoding)),
        );

        wire
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
#[must_use]
pub struct RequestBuilder {
    method: HttpMethod,
    url: String,
    parameters: Option<Parameters>,
    request_encoding: RequestEncoding,
    response_encoding: ResponseEncoding,
    authorization_header: Option<String>,
}

impl RequestBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::default(),
            url: url.into(),
            parameters: None,
            request_encoding: RequestEncoding::default(),
            response_encoding: ResponseEncoding::default(),
            authorization_header: None,
        }
    }

    /// Set the method. Defaults to `GET`.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Replace the parameters wholesale.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Add a single parameter, replacing any previous value under the same key.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters
            .get_or_insert_with(Parameters::new)
            .insert(key.into(), value.into());
        self
    }

    /// Set the body encoding. Defaults to JSON.
    pub fn request_encoding(mut self, encoding: RequestEncoding) -> Self {
        self.request_encoding = encoding;
        self
    }

    /// Set the preferred response representation. Defaults to JSON.
    pub fn response_encoding(mut self, encoding: ResponseEncoding) -> Self {
        self.response_encoding = encoding;
        self
    }

    /// Send `value` verbatim as the `Authorization` header, overriding any shared token.
    pub fn authorization_header(mut self, value: impl Into<String>) -> Self {
        self.authorization_header = Some(value.into());
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidUrl`] if the URL does not parse, and
    /// [`BuildError::InvalidHeader`] if the authorization header is not a legal header value.
    pub fn build(self) -> Result<Request, BuildError> {
        let url = Url::parse(&self.url).map_err(|source| BuildError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;

        let authorization_header = self
            .authorization_header
            .map(|value| {
                HeaderValue::try_from(value).map(|mut header| {
                    header.set_sensitive(true);
                    header
                })
            })
            .transpose()?;

        Ok(Request {
            method: self.method,
            url,
            parameters: self.parameters,
            request_encoding: self.request_encoding,
            response_encoding: self.response_encoding,
            authorization_header,
        })
    }
}

/// A transport-ready request.
///
/// Owned by the dispatcher until it is handed to a [`Transport`](crate::Transport).
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// The HTTP method.
    pub method: Method,
    /// The fully-qualified URL, query string included.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl WireRequest {
    /// The value of one of the headers this crate manages, if present and printable.
    #[must_use]
    pub fn header(&self, header: RequestHeader) -> Option<&str> {
        self.headers
            .get(header.name())
            .and_then(|value| value.to_str().ok())
    }
}
