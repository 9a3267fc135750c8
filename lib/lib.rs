//! Declarative HTTP request building and dispatch.
//!
//! Describe a request with [`Request`], send it with a [`Dispatcher`], and receive a classified
//! [`Completion`] on the dispatcher's delivery task.

/// Transport backends.
pub mod backends;
pub mod classify;
pub mod config;
mod dispatcher;
/// Parameter encodings and content negotiation.
pub mod encoding;
pub mod error;
pub mod request;
/// In-flight request bookkeeping.
pub mod task;
mod transport;

#[cfg(feature = "reqwest-client")]
pub use backends::ReqwestTransport;
#[cfg(feature = "ureq-client")]
pub use backends::UreqTransport;
pub use classify::{Body, Completion, RawCompletion, ResponseHead, classify};
pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::Dispatcher;
pub use encoding::{
    ParamValue, Parameters, RequestEncoding, RequestHeader, ResponseEncoding, accept_header_value,
    encode_body, encode_query, form_urlencode,
};
pub use error::{BuildError, RequestError, RequestErrorCode, TransportError};
pub use request::{HttpMethod, Request, RequestBuilder, WireRequest};
pub use task::{Task, TaskId, TaskRegistry};
pub use transport::Transport;
