//! Transport abstraction for pluggable HTTP backends.

use std::future::Future;

use crate::classify::RawCompletion;
use crate::request::WireRequest;

/// Performs the actual network I/O for a [`WireRequest`].
///
/// Implementations must support many outstanding requests at once. Failures are reported inside
/// the [`RawCompletion`] rather than as a `Result`, because a transport may have received a
/// response head and still failed afterwards.
///
/// Uses Rust edition 2024's native `impl Future` in traits (RPITIT), no `async-trait` macro
/// required.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and report everything that came back.
    fn send(&self, request: WireRequest) -> impl Future<Output = RawCompletion> + Send;
}
