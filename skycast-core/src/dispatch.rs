//! Shared HTTP dispatch layer.
//!
//! Every upstream call in the app goes through a single [`Dispatcher`], which
//! adds two behaviours on top of the raw transport:
//!
//! - **De-duplication**: issuing a request while an identical one (same
//!   method, url, params, body) is still in flight cancels the older request.
//!   The superseded caller observes [`DispatchError::Superseded`] and can
//!   silently drop it.
//! - **Retry**: timeouts, connection failures and 5xx responses are retried
//!   up to 3 times with linear backoff (1s, 2s, 3s) before the failure is
//!   surfaced. 4xx responses and supersession are never retried.
//!
//! The pending-request registry is owned by the `Dispatcher` instance, not a
//! process-wide global; construct one at startup and share it between
//! clients (tests get a fresh one each).

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Retries per request on top of the initial attempt.
const MAX_RETRIES: u32 = 3;

/// Base backoff unit; attempt `n` waits `n * RETRY_DELAY`.
const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Per-request transport timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// An outgoing request, immutable once issued.
///
/// Query params are kept as pairs rather than a map so call sites can pass
/// repeated keys; ordering does not affect de-duplication (see
/// [`fingerprint`]).
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RequestDescriptor {
    /// Convenience constructor for the GET-with-query-params shape every
    /// current call site uses.
    pub fn get(url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self { method: Method::GET, url: url.into(), params, body: None }
    }
}

/// Canonical fingerprint of a request: `method:url:params:body`.
///
/// Pure function of the descriptor. Params are sorted by key before
/// serialization and JSON object keys serialize in sorted order, so two
/// semantically equal descriptors collide regardless of insertion order.
/// (The ancestor of this code keyed on insertion order, which silently
/// missed reordered duplicates; sorting here is a deliberate change.)
///
/// Each param component is JSON-quoted, so delimiter characters inside a
/// value can never make two structurally different descriptors collide.
pub fn fingerprint(request: &RequestDescriptor) -> String {
    let mut params = request.params.clone();
    params.sort();

    let mut key = format!("{}:{}:", request.method, request.url);
    for (name, value) in &params {
        key.push_str(&serde_json::Value::from(name.as_str()).to_string());
        key.push('=');
        key.push_str(&serde_json::Value::from(value.as_str()).to_string());
        key.push('&');
    }
    key.push(':');
    match &request.body {
        // serde_json::Value objects are backed by a BTreeMap, so Display
        // output is already key-sorted.
        Some(body) => key.push_str(&body.to_string()),
        None => key.push_str("null"),
    }
    key
}

/// A settled response from the transport, success or not. Status
/// classification happens in the dispatcher, not the transport.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response at all. Always transient.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Everything a dispatched request can settle with.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A newer request with the same fingerprint cancelled this one.
    /// Terminal and never retried; callers may drop it silently.
    #[error("request superseded by a newer identical request")]
    Superseded,

    /// A response was received with a non-success status. Transient when
    /// 5xx, terminal otherwise.
    #[error("http status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    /// No response was received.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A transient failure persisted past the retry budget.
    #[error("giving up after {attempts} retries: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    /// Transient failures are eligible for retry: timeout/connection/network
    /// errors and 5xx responses. 4xx and supersession are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Transport(_) => true,
            DispatchError::Status { status, .. } => *status >= 500,
            DispatchError::Superseded | DispatchError::RetriesExhausted { .. } => false,
        }
    }
}

/// The seam between the dispatcher and the network.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportReply, TransportError>;
}

/// Production transport over reqwest with a fixed per-request timeout.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportReply, TransportError> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .query(&request.params)
            .timeout(REQUEST_TIMEOUT);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(TransportReply { status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Registry slot for one in-flight request. The generation id makes
/// settlement removal idempotent: a late settlement (or a cancellation
/// racing with one) only removes the entry it registered, never a newer
/// request's slot under the same fingerprint.
#[derive(Debug)]
struct PendingEntry {
    id: u64,
    token: CancellationToken,
}

/// Request dispatcher: de-duplicating, retrying front door to the transport.
#[derive(Debug)]
pub struct Dispatcher<T: Transport = HttpTransport> {
    transport: T,
    pending: Mutex<HashMap<String, PendingEntry>>,
    next_id: AtomicU64,
}

impl Dispatcher<HttpTransport> {
    pub fn new() -> Self {
        Self::with_transport(HttpTransport::new())
    }
}

impl Default for Dispatcher<HttpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport, pending: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) }
    }

    /// Dispatch a request, retrying transient failures.
    ///
    /// Explicit retry loop rather than re-entrant recursion: every attempt
    /// goes through the same registration path in [`Self::dispatch_once`],
    /// so the at-most-one-in-flight-per-fingerprint invariant holds across
    /// retries as well.
    pub async fn dispatch(
        &self,
        request: &RequestDescriptor,
    ) -> Result<TransportReply, DispatchError> {
        let mut attempts: u32 = 0;

        loop {
            match self.dispatch_once(request).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_transient() && attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::warn!(
                        attempt = attempts,
                        url = %request.url,
                        error = %err,
                        "retrying transient failure"
                    );
                    tokio::time::sleep(RETRY_DELAY * attempts).await;
                }
                Err(err) if err.is_transient() => {
                    tracing::error!(url = %request.url, error = %err, "retry budget exhausted");
                    return Err(DispatchError::RetriesExhausted {
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    if !matches!(err, DispatchError::Superseded) {
                        tracing::error!(url = %request.url, error = %err, "request failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// One attempt: register under the fingerprint (cancelling any in-flight
    /// duplicate), forward to the transport, deregister on settlement.
    async fn dispatch_once(
        &self,
        request: &RequestDescriptor,
    ) -> Result<TransportReply, DispatchError> {
        let key = fingerprint(request);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        {
            let mut pending = self.pending.lock().await;
            if let Some(previous) = pending.remove(&key) {
                tracing::debug!(url = %request.url, "cancelling superseded duplicate");
                previous.token.cancel();
            }
            pending.insert(key.clone(), PendingEntry { id, token: token.clone() });
        }

        tracing::info!(method = %request.method, url = %request.url, "dispatching request");

        let outcome = tokio::select! {
            () = token.cancelled() => Err(DispatchError::Superseded),
            sent = self.transport.send(request) => sent.map_err(DispatchError::from),
        };

        // Settle: remove our registry slot if it is still ours. A superseding
        // request may already have replaced it, in which case this is a no-op.
        {
            let mut pending = self.pending.lock().await;
            if pending.get(&key).is_some_and(|entry| entry.id == id) {
                pending.remove(&key);
            }
        }

        let reply = outcome?;
        if !reply.is_success() {
            return Err(DispatchError::Status {
                status: reply.status,
                url: request.url.clone(),
                body: truncate_body(&reply.body),
            });
        }

        tracing::info!(status = reply.status, url = %request.url, "request settled");
        Ok(reply)
    }

    /// Number of requests currently in flight. Exposed for observability.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Cut on a char boundary; byte 200 may land inside a multibyte char.
    let mut cut = MAX;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}
