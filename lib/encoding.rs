//! Parameter encodings and content negotiation.
//!
//! Everything in here is pure: parameters in, bytes or strings out.

use std::fmt;

use bytes::Bytes;
use hashlink::LinkedHashMap;
use http::HeaderName;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map, Number, Value};
use tracing::trace;

/// MIME type of JSON payloads. Also used to detect JSON responses.
pub const JSON_MIME: &str = "application/json";

/// MIME type of URL-form payloads.
pub const FORM_MIME: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Bytes that must be escaped inside a form key or value.
///
/// Controls, space, the characters disallowed in a query, and the form delimiters `&`, `=` and `+`.
const FORM_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'&')
    .add(b'=')
    .add(b'+');

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A string.
    Str(String),
    /// A 32-bit integer.
    Int(i32),
    /// A 64-bit integer.
    Int64(i64),
    /// A boolean.
    Bool(bool),
    /// A floating point number.
    Float(f64),
}

impl ParamValue {
    /// The natural JSON scalar for this value, or `None` if it has no JSON representation.
    fn to_json(&self) -> Option<Value> {
        match self {
            Self::Str(s) => Some(Value::String(s.clone())),
            Self::Int(i) => Some(Value::from(*i)),
            Self::Int64(i) => Some(Value::from(*i)),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Request parameters, iterated in insertion order.
pub type Parameters = LinkedHashMap<String, ParamValue>;

/// Wire-exact names of the headers this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestHeader {
    /// `Authorization`
    Authorization,
    /// `Content-Type`
    ContentType,
    /// `Accept`
    Accept,
}

impl RequestHeader {
    /// The canonical spelling of the header name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "Authorization",
            Self::ContentType => "Content-Type",
            Self::Accept => "Accept",
        }
    }

    /// The header name as used in a [`http::HeaderMap`].
    #[must_use]
    pub fn name(self) -> HeaderName {
        match self {
            Self::Authorization => AUTHORIZATION,
            Self::ContentType => CONTENT_TYPE,
            Self::Accept => ACCEPT,
        }
    }
}

/// How parameters are encoded into a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestEncoding {
    /// A JSON object.
    #[default]
    Json,
    /// `key=value` pairs joined by `&`.
    UrlForm,
}

impl RequestEncoding {
    /// The `Content-Type` value announcing this encoding.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Json => JSON_MIME,
            Self::UrlForm => FORM_MIME,
        }
    }

    /// The header this encoding is announced in.
    #[must_use]
    pub const fn header(self) -> RequestHeader {
        RequestHeader::ContentType
    }
}

/// The response representation a request prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseEncoding {
    /// `*/*`
    Any,
    /// `application/json`
    #[default]
    Json,
    /// `text/html`
    Html,
    /// `image/*`
    Image,
    /// `image/jpg`
    Jpeg,
    /// `image/png`
    Png,
}

impl ResponseEncoding {
    /// The header this preference is announced in.
    #[must_use]
    pub const fn header(self) -> RequestHeader {
        RequestHeader::Accept
    }
}

/// Map a response preference to its `Accept` header value.
#[must_use]
pub const fn accept_header_value(encoding: ResponseEncoding) -> &'static str {
    match encoding {
        ResponseEncoding::Any => "*/*",
        ResponseEncoding::Json => JSON_MIME,
        ResponseEncoding::Html => "text/html",
        ResponseEncoding::Image => "image/*",
        ResponseEncoding::Jpeg => "image/jpg",
        ResponseEncoding::Png => "image/png",
    }
}

/// Encode `parameters` into a request body.
///
/// Returns `None` when there are no parameters, or when a JSON body cannot be produced because
/// some value has no JSON representation (a non-finite float). Encoding is best-effort and never
/// fails loudly.
#[must_use]
pub fn encode_body(parameters: Option<&Parameters>, encoding: RequestEncoding) -> Option<Bytes> {
    let parameters = parameters?;
    match encoding {
        RequestEncoding::Json => {
            let mut object = Map::with_capacity(parameters.len());
            for (key, value) in parameters {
                let Some(json) = value.to_json() else {
                    trace!(key = %key, "parameter has no JSON representation, omitting body");
                    return None;
                };
                object.insert(key.clone(), json);
            }
            serde_json::to_vec(&Value::Object(object))
                .ok()
                .map(Bytes::from)
        }
        RequestEncoding::UrlForm => Some(Bytes::from(form_urlencode(&encode_query(parameters)))),
    }
}

/// Join `pairs` as `key=value` items separated by `&`, percent-escaping keys and values.
///
/// Used for both form bodies and query strings, so a space is always `%20` and never `+`.
#[must_use]
pub fn form_urlencode(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, FORM_COMPONENT),
                utf8_percent_encode(value, FORM_COMPONENT)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Convert `parameters` into query items.
#[must_use]
pub fn encode_query(parameters: &Parameters) -> Vec<(String, String)> {
    parameters
        .iter()
        .map(|(key, value)| (key.clone(), value.to_string()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params() -> Parameters {
        let mut p = Parameters::new();
        p.insert("florp".to_owned(), "dorp".into());
        p.insert("boo".to_owned(), true.into());
        p.insert("number".to_owned(), 1.into());
        p.insert("double".to_owned(), 1.2.into());
        p.insert("bigNum".to_owned(), 42_i64.into());
        p
    }

    #[test]
    fn param_values_stringify_naturally() {
        assert_eq!(ParamValue::from("x").to_string(), "x");
        assert_eq!(ParamValue::from(7).to_string(), "7");
        assert_eq!(ParamValue::from(-9_000_000_000_i64).to_string(), "-9000000000");
        assert_eq!(ParamValue::from(false).to_string(), "false");
        assert_eq!(ParamValue::from(1.5).to_string(), "1.5");
    }

    #[test]
    fn json_body_uses_natural_scalars() {
        let body = encode_body(Some(&params()), RequestEncoding::Json).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["florp"], "dorp");
        assert_eq!(value["boo"], true);
        assert_eq!(value["number"], 1);
        assert_eq!(value["double"], 1.2);
        assert_eq!(value["bigNum"], 42);
    }

    #[test]
    fn json_body_is_omitted_for_non_finite_floats() {
        let mut p = params();
        p.insert("bad".to_owned(), f64::NAN.into());
        assert!(encode_body(Some(&p), RequestEncoding::Json).is_none());
    }

    #[test]
    fn no_parameters_means_no_body() {
        assert!(encode_body(None, RequestEncoding::Json).is_none());
        assert!(encode_body(None, RequestEncoding::UrlForm).is_none());
    }

    #[test]
    fn form_body_joins_escaped_pairs() {
        let mut p = Parameters::new();
        p.insert("name".to_owned(), "a b&c=d".into());
        p.insert("ünï".to_owned(), 3.into());
        let body = encode_body(Some(&p), RequestEncoding::UrlForm).unwrap();
        assert_eq!(&body[..], b"name=a%20b%26c%3Dd&%C3%BCn%C3%AF=3");
    }

    #[test]
    fn json_and_form_bodies_differ() {
        let p = params();
        let json = encode_body(Some(&p), RequestEncoding::Json);
        let form = encode_body(Some(&p), RequestEncoding::UrlForm);
        assert_ne!(json, form);
        assert_ne!(RequestEncoding::Json.mime(), RequestEncoding::UrlForm.mime());
    }

    #[test]
    fn query_items_keep_insertion_order() {
        let items = encode_query(&params());
        let keys: Vec<&str> = items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["florp", "boo", "number", "double", "bigNum"]);
        assert_eq!(items[1].1, "true");
    }

    #[test]
    fn accept_values_are_wire_exact() {
        assert_eq!(accept_header_value(ResponseEncoding::Any), "*/*");
        assert_eq!(accept_header_value(ResponseEncoding::Json), "application/json");
        assert_eq!(accept_header_value(ResponseEncoding::Html), "text/html");
        assert_eq!(accept_header_value(ResponseEncoding::Image), "image/*");
        assert_eq!(accept_header_value(ResponseEncoding::Jpeg), "image/jpg");
        assert_eq!(accept_header_value(ResponseEncoding::Png), "image/png");
    }

    #[test]
    fn encodings_announce_their_headers() {
        assert_eq!(RequestEncoding::Json.header().as_str(), "Content-Type");
        assert_eq!(ResponseEncoding::Json.header().as_str(), "Accept");
    }
}
