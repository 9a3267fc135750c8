//! Transport backend implementations.

#[cfg(feature = "reqwest-client")]
mod reqwest_transport;
#[cfg(feature = "reqwest-client")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "ureq-client")]
mod ureq_transport;
#[cfg(feature = "ureq-client")]
pub use ureq_transport::UreqTransport;
