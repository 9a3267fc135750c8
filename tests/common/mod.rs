#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use request_manager::{RawCompletion, ResponseHead, Transport, WireRequest};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, oneshot};

type Responder = Arc<dyn Fn(&WireRequest) -> RawCompletion + Send + Sync>;

/// A transport that records every request and answers from a scripted responder.
///
/// When gated, each request waits for a permit on the gate before answering, so tests can
/// observe requests while they are in flight.
#[derive(Clone)]
pub struct MockTransport {
    pub sent: Arc<Mutex<Vec<WireRequest>>>,
    pub calls: Arc<AtomicUsize>,
    responder: Responder,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&WireRequest) -> RawCompletion + Send + Sync + 'static,
    {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            responder: Arc::new(responder),
            gate: None,
        }
    }

    /// Always answers `200 application/json` with `body`.
    pub fn json(body: &'static str) -> Self {
        Self::responding(move |_| json_response(200, body))
    }

    /// Returns a gated copy of this transport and the gate controlling it.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Requests seen so far, in submission order.
    pub fn sent_requests(&self) -> Vec<WireRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: WireRequest) -> impl Future<Output = RawCompletion> + Send {
        let this = self.clone();
        async move {
            this.calls.fetch_add(1, Ordering::SeqCst);
            this.sent.lock().unwrap().push(request.clone());
            if let Some(gate) = &this.gate {
                gate.acquire().await.unwrap().forget();
            }
            (this.responder)(&request)
        }
    }
}

pub fn head(status: u16, content_type: Option<&'static str>) -> ResponseHead {
    let mut head = ResponseHead::new(StatusCode::from_u16(status).unwrap());
    if let Some(content_type) = content_type {
        head.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    head
}

pub fn json_response(status: u16, body: &'static str) -> RawCompletion {
    RawCompletion::received(
        head(status, Some("application/json")),
        Bytes::from_static(body.as_bytes()),
    )
}

pub fn html_response(status: u16, body: &'static str) -> RawCompletion {
    RawCompletion::received(
        head(status, Some("text/html; charset=utf-8")),
        Bytes::from_static(body.as_bytes()),
    )
}

/// Serve exactly one canned HTTP/1.1 response and hand back the raw request text.
pub async fn serve_once(
    status_line: &'static str,
    content_type: &'static str,
    body: &'static str,
) -> (SocketAddr, oneshot::Receiver<String>) {
    serve_raw(format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ))
    .await
}

/// Serve exactly one connection, answering with `response` verbatim and then closing.
pub async fn serve_raw(response: String) -> (SocketAddr, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0_u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&received) {
                break;
            }
        }

        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        let _ = tx.send(String::from_utf8_lossy(&received).into_owned());
    });

    (addr, rx)
}

/// Whether `raw` holds the full head plus a body of the announced length.
fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..head_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}

/// An address nothing is listening on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
