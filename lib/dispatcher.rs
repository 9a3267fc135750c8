//! The request dispatcher.
//!
//! A [`Dispatcher`] turns [`Request`] descriptors into wire requests, hands them to its
//! [`Transport`], tracks them while in flight, and delivers each classified [`Completion`] to the
//! caller's callback.
//!
//! # Threading
//!
//! Transport futures run as independent tokio tasks (the worker context). Callbacks, however, are
//! never run on those tasks: every completion is funnelled through one channel into a single
//! delivery task owned by the dispatcher, so callbacks run one at a time on the same task
//! regardless of which worker produced the raw result.
//!
//! The delivery task lives on the runtime that delivered the first completion. If that runtime
//! shuts down while the dispatcher is still in use, the next completion starts a new delivery
//! task on the runtime it finished on.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};

use http::HeaderValue;
use parking_lot::{Mutex, RwLock};
use secrecy::ExposeSecret as _;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument as _, debug, error, info_span, instrument, warn};

#[cfg(feature = "reqwest-client")]
use crate::backends::ReqwestTransport;
use crate::classify::{Completion, RawCompletion, classify};
use crate::config::DispatcherConfig;
use crate::encoding::RequestHeader;
use crate::error::{BuildError, RequestError, RequestErrorCode};
use crate::request::{Request, WireRequest};
use crate::task::{Task, TaskId, TaskRegistry};
use crate::transport::Transport;

type Callback = Box<dyn FnOnce(Completion) + Send + 'static>;
type TransportFactory<T> = Box<dyn FnOnce() -> Arc<T> + Send>;

struct Delivery {
    id: TaskId,
    completion: Completion,
    callback: Callback,
}

struct DispatcherInner<T: Transport> {
    transport: LazyLock<Arc<T>, TransportFactory<T>>,
    token: RwLock<Option<HeaderValue>>,
    registry: TaskRegistry,
    delivery: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
}

/// Sends [`Request`]s through a [`Transport`] and delivers classified results.
///
/// Cheap to clone; clones share the transport, the token, and the task registry.
pub struct Dispatcher<T: Transport> {
    inner: Arc<DispatcherInner<T>>,
}

impl<T: Transport> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.inner.registry.len())
            .field("has_token", &self.has_authorization_token())
            .finish_non_exhaustive()
    }
}

impl<T: Transport + Default> Dispatcher<T> {
    /// A dispatcher whose transport is created with `T::default()` on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport_factory(T::default)
    }
}

impl<T: Transport + Default> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Dispatcher<T> {
    /// A dispatcher using `transport`.
    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self::with_transport_factory(move || transport)
    }

    /// A dispatcher whose transport is created by `factory` on first use.
    #[must_use]
    pub fn with_transport_factory<F>(factory: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let factory: TransportFactory<T> = Box::new(move || Arc::new(factory()));
        Self {
            inner: Arc::new(DispatcherInner {
                transport: LazyLock::new(factory),
                token: RwLock::new(None),
                registry: TaskRegistry::new(),
                delivery: Mutex::new(None),
            }),
        }
    }

    /// A dispatcher configured from `config`, with its transport built by `factory` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidHeader`] if the configured token cannot be sent as a header.
    pub fn from_config_with<F>(config: &DispatcherConfig, factory: F) -> Result<Self, BuildError>
    where
        F: FnOnce(&DispatcherConfig) -> T + Send + 'static,
    {
        let owned = config.clone();
        let dispatcher = Self::with_transport_factory(move || factory(&owned));
        if let Some(token) = &config.authorization_token {
            dispatcher.set_authorization_token(token.expose_secret())?;
        }
        Ok(dispatcher)
    }

    /// Set the shared token, sent as `Authorization: Token <token>` on requests that carry no
    /// authorization header of their own. Takes effect for subsequent dispatches.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidHeader`] if the token contains bytes not allowed in a header.
    pub fn set_authorization_token(&self, token: &str) -> Result<(), BuildError> {
        let mut value = HeaderValue::try_from(format!("Token {token}"))?;
        value.set_sensitive(true);
        *self.inner.token.write() = Some(value);
        Ok(())
    }

    /// Forget the shared token.
    pub fn clear_authorization_token(&self) {
        *self.inner.token.write() = None;
    }

    /// Whether a shared token is set.
    #[must_use]
    pub fn has_authorization_token(&self) -> bool {
        self.inner.token.read().is_some()
    }

    /// The registry of in-flight requests.
    #[must_use]
    pub fn tasks(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// The transport, creating it if this is the first use.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Build the wire request `send` would submit for `request`, without sending it.
    ///
    /// A header set on the request always wins; otherwise the shared token is used, if any.
    #[must_use]
    pub fn wire_request_for(&self, request: &Request) -> WireRequest {
        let mut wire = request.to_wire();
        if request.authorization_header().is_none() {
            if let Some(token) = self.inner.token.read().clone() {
                wire.headers.insert(RequestHeader::Authorization.name(), token);
            }
        }
        wire
    }

    /// Dispatch `request` and return immediately.
    ///
    /// `completion` is invoked exactly once, on the dispatcher's delivery task, unless the
    /// request is [forgotten](Self::forget) before it completes.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(
        name = "Dispatcher::send",
        skip(self, request, completion),
        fields(method = %request.method(), url = %request.url())
    )]
    pub fn send<F>(&self, request: &Request, completion: F) -> TaskId
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let wire = self.wire_request_for(request);
        let id = self.inner.registry.issue_id();
        self.inner.registry.add(Task::new(id, &wire));
        debug!(%id, "dispatching");

        let inner = Arc::clone(&self.inner);
        let callback: Callback = Box::new(completion);
        tokio::spawn(
            async move {
                let raw = inner.transport.send(wire).await;
                inner.finish(id, raw, callback);
            }
            .instrument(info_span!("Dispatcher::transport", %id)),
        );

        id
    }

    /// Dispatch `request` and wait for its completion.
    ///
    /// Goes through the same registry, classifier, and delivery task as [`send`](Self::send). If
    /// the request is forgotten before it completes, yields a `RequestFailed` completion.
    pub async fn send_async(&self, request: &Request) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.send(request, move |completion| {
            // The receiver only goes away if the caller stopped waiting.
            let _ = tx.send(completion);
        });
        rx.await
            .unwrap_or_else(|_| Completion::failed(RequestErrorCode::RequestFailed))
    }

    /// Stop tracking an in-flight request. Its completion will be discarded without invoking the
    /// callback.
    ///
    /// The transport is not interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`RequestErrorCode::NoRequestFound`] if `id` is not in flight.
    pub fn forget(&self, id: TaskId) -> Result<Task, RequestError> {
        self.inner.registry.remove(id)
    }
}

#[cfg(feature = "reqwest-client")]
impl Dispatcher<ReqwestTransport> {
    /// A reqwest-backed dispatcher configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidHeader`] if the configured token cannot be sent as a header.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, BuildError> {
        Self::from_config_with(config, ReqwestTransport::from_config)
    }
}

impl<T: Transport> DispatcherInner<T> {
    /// Correlate, classify, and hand a raw result to the delivery task.
    fn finish(&self, id: TaskId, raw: RawCompletion, callback: Callback) {
        if self.registry.find(id).is_none() {
            debug!(%id, "no task for completion, dropping it");
            return;
        }

        let completion = classify(raw);

        if let Err(e) = self.registry.remove(id) {
            // Forgotten between lookup and removal.
            debug!(%id, error = %e, "task vanished before delivery, dropping completion");
            return;
        }

        self.deliver(Delivery {
            id,
            completion,
            callback,
        });
    }

    /// Queue `delivery` on the delivery task, starting one on the current runtime if there is
    /// none or the previous one died with its runtime.
    fn deliver(&self, delivery: Delivery) {
        let mut sender = self.delivery.lock();
        let delivery = match sender.as_ref() {
            Some(tx) => match tx.send(delivery) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    debug!(id = %returned.id, "delivery task is gone, starting a new one");
                    returned
                }
            },
            None => delivery,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_delivery(rx));
        if let Err(mpsc::error::SendError(lost)) = tx.send(delivery) {
            warn!(id = %lost.id, "runtime is shutting down, completion lost");
        }
        *sender = Some(tx);
    }
}

/// The single callback context: runs callbacks one at a time, in arrival order.
async fn run_delivery(mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(Delivery {
        id,
        completion,
        callback,
    }) = rx.recv().await
    {
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(completion))).is_err() {
            error!(%id, "completion callback panicked");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;

    use super::*;

    #[derive(Debug, Default)]
    struct NeverCalled;

    impl Transport for NeverCalled {
        fn send(&self, _request: WireRequest) -> impl Future<Output = RawCompletion> + Send {
            std::future::ready(RawCompletion::default())
        }
    }

    #[test]
    fn manager_token_is_used_when_request_has_none() {
        let dispatcher = Dispatcher::<NeverCalled>::new();
        dispatcher.set_authorization_token("token").unwrap();

        let wire = dispatcher.wire_request_for(&Request::get("http://derp.derp/").unwrap());
        assert_eq!(wire.header(RequestHeader::Authorization), Some("Token token"));
    }

    #[test]
    fn request_header_takes_precedence() {
        let dispatcher = Dispatcher::<NeverCalled>::new();
        dispatcher.set_authorization_token("token").unwrap();

        let request = Request::builder("http://derp.derp/")
            .authorization_header("custom auth header. #winning")
            .build()
            .unwrap();
        let wire = dispatcher.wire_request_for(&request);

        let values: Vec<_> = wire
            .headers
            .get_all(RequestHeader::Authorization.name())
            .iter()
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "custom auth header. #winning");
    }

    #[test]
    fn no_token_no_header() {
        let dispatcher = Dispatcher::<NeverCalled>::new();
        let wire = dispatcher.wire_request_for(&Request::get("http://derp.derp/").unwrap());
        assert!(wire.header(RequestHeader::Authorization).is_none());
    }

    #[test]
    fn token_can_be_replaced_and_cleared() {
        let dispatcher = Dispatcher::<NeverCalled>::new();
        let request = Request::get("http://derp.derp/").unwrap();

        dispatcher.set_authorization_token("one").unwrap();
        dispatcher.set_authorization_token("two").unwrap();
        assert_eq!(
            dispatcher
                .wire_request_for(&request)
                .header(RequestHeader::Authorization),
            Some("Token two")
        );

        dispatcher.clear_authorization_token();
        assert!(!dispatcher.has_authorization_token());
        assert!(
            dispatcher
                .wire_request_for(&request)
                .header(RequestHeader::Authorization)
                .is_none()
        );
    }

    #[test]
    fn illegal_token_is_rejected() {
        let dispatcher = Dispatcher::<NeverCalled>::new();
        assert!(dispatcher.set_authorization_token("bad\r\ntoken").is_err());
        assert!(!dispatcher.has_authorization_token());
    }

    #[test]
    fn from_config_installs_token() {
        let config = DispatcherConfig::from_toml_str(r#"authorization-token = "abc""#).unwrap();
        let dispatcher = Dispatcher::from_config_with(&config, |_| NeverCalled).unwrap();
        assert!(dispatcher.has_authorization_token());
    }

    #[test]
    fn forgetting_unknown_task_reports_no_request_found() {
        let dispatcher = Dispatcher::<NeverCalled>::new();
        let id = dispatcher.tasks().issue_id();
        let err = dispatcher.forget(id).unwrap_err();
        assert_eq!(err.code(), Some(RequestErrorCode::NoRequestFound));
    }
}
