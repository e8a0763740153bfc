//! Session layer: request/response correlation and inbound dispatch.
//!
//! A [`Session`] owns one pending-request table and one outbound ordering
//! path through its attached transport. It is the dispatcher handed to
//! [`Transport::start`]: inbound requests are routed to registered handlers,
//! inbound responses resolve the matching pending entry, notifications are
//! routed or silently dropped.
//!
//! Correlation invariants:
//! - every locally sent request resolves exactly once, by the first of a
//!   matching response or timeout expiry, and its table entry is removed on
//!   either outcome;
//! - late, duplicate, or unknown responses are dropped;
//! - an inbound request always produces exactly one response carrying the
//!   original id (`METHOD_NOT_FOUND` when no handler is registered).
//!
//! Bookkeeping is processed one message at a time; handler bodies are
//! offloaded to the injected [`WorkerPool`] so they may run concurrently
//! with dispatch of the next message. Outbound writes stay serialized by the
//! transport regardless of handler concurrency.

pub mod capabilities;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::rpc::envelope::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, RpcError,
};
use crate::transport::{MessageDispatcher, Transport};
use crate::worker::WorkerPool;
use crate::{ConduitError, Result};

/// Handler for an inbound request: params in, result or error payload out.
///
/// The error arm is converted to an error response at the dispatch boundary;
/// it never terminates the session.
pub type RequestHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, std::result::Result<Value, RpcError>> + Send + Sync>;

/// Handler for an inbound notification.
pub type NotificationHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome channel payload for one pending request.
type PendingSender = oneshot::Sender<std::result::Result<Value, RpcError>>;

/// Session tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Deadline for outbound requests, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl SessionConfig {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// One protocol session over one transport connection.
pub struct Session {
    config: SessionConfig,
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, PendingSender>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    request_handlers: Mutex<HashMap<String, RequestHandler>>,
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
    pool: Arc<dyn WorkerPool>,
}

impl Session {
    /// Create a detached session; call [`attach`](Session::attach) once the
    /// transport is live.
    #[must_use]
    pub fn new(config: SessionConfig, pool: Arc<dyn WorkerPool>) -> Arc<Self> {
        Arc::new(Self {
            config,
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            transport: RwLock::new(None),
            request_handlers: Mutex::new(HashMap::new()),
            notification_handlers: Mutex::new(HashMap::new()),
            pool,
        })
    }

    /// Bind the session to a live transport connection.
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        *self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(transport);
    }

    /// Register the request handler for `method`. Replaces any previous one.
    pub fn on_request(&self, method: impl Into<String>, handler: RequestHandler) {
        self.request_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.into(), handler);
    }

    /// Register the notification handler for `method`.
    pub fn on_notification(&self, method: impl Into<String>, handler: NotificationHandler) {
        self.notification_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.into(), handler);
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Send a request and await its typed outcome.
    ///
    /// Resolves by the first of a matching response or timeout expiry; the
    /// pending entry is removed on either outcome, exactly once.
    ///
    /// # Errors
    ///
    /// - [`ConduitError::Detached`] when no transport is attached.
    /// - [`ConduitError::Timeout`] when the deadline expires first.
    /// - [`ConduitError::Remote`] when the remote answers with an error
    ///   payload.
    /// - [`ConduitError::Transport`] when the send fails or the session
    ///   terminates before a response arrives.
    /// - [`ConduitError::Serde`] when the result does not deserialize as `T`.
    pub async fn send_request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T> {
        let transport = self.transport()?;
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);

        let request = JsonRpcMessage::Request(JsonRpcRequest {
            id: id.clone(),
            method: method.to_owned(),
            params,
        });
        if let Err(e) = transport.send_message(request).await {
            self.remove_pending(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout(), rx).await {
            Ok(Ok(Ok(value))) => Ok(serde_json::from_value(value)?),
            Ok(Ok(Err(rpc_err))) => Err(ConduitError::Remote(rpc_err)),
            Ok(Err(_closed)) => Err(ConduitError::Transport(
                "session terminated before response".into(),
            )),
            Err(_elapsed) => {
                // A response racing the deadline may already have consumed
                // the entry; the caller still observes exactly one outcome.
                self.remove_pending(&id);
                Err(ConduitError::Timeout {
                    method: method.to_owned(),
                })
            }
        }
    }

    /// Send a notification. Completion means handed to the transport, not
    /// processed by the remote.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Detached`] when no transport is attached;
    /// [`ConduitError::Transport`] when the enqueue fails.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let transport = self.transport()?;
        transport
            .send_message(JsonRpcMessage::Notification(JsonRpcNotification {
                method: method.to_owned(),
                params,
            }))
            .await
    }

    /// Fail every pending request, e.g. after the connection terminated.
    ///
    /// Callers waiting in [`send_request`](Session::send_request) observe a
    /// transport error.
    pub fn fail_pending(&self) {
        let drained: Vec<PendingSender> = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            drop(tx);
        }
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ConduitError::Detached)
    }

    fn remove_pending(&self, id: &RequestId) -> Option<PendingSender> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn request_handler(&self, method: &str) -> Option<RequestHandler> {
        self.request_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned()
    }

    fn notification_handler(&self, method: &str) -> Option<NotificationHandler> {
        self.notification_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned()
    }

    /// Run `handler` on the worker pool and deliver its response.
    fn offload_request(&self, id: RequestId, method: String, fut: BoxFuture<'static, std::result::Result<Value, RpcError>>) {
        let transport = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.pool.spawn(Box::pin(async move {
            let response = match fut.await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::failure(id, err),
            };
            let Some(transport) = transport else {
                warn!(method, "no transport attached, dropping handler response");
                return;
            };
            if let Err(e) = transport
                .send_message(JsonRpcMessage::Response(response))
                .await
            {
                // The connection terminated while the handler ran; only the
                // delivery of its result is discarded.
                warn!(method, error = %e, "response delivery discarded");
            }
        }));
    }
}

#[async_trait]
impl MessageDispatcher for Session {
    async fn dispatch(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(req) => {
                let Some(handler) = self.request_handler(&req.method) else {
                    debug!(method = req.method.as_str(), "unknown request method");
                    return Some(JsonRpcMessage::Response(JsonRpcResponse::failure(
                        req.id,
                        RpcError::method_not_found(&req.method),
                    )));
                };
                self.offload_request(req.id, req.method, handler(req.params));
                None
            }
            JsonRpcMessage::Notification(note) => {
                match self.notification_handler(&note.method) {
                    Some(handler) => self.pool.spawn(handler(note.params)),
                    None => {
                        debug!(method = note.method.as_str(), "unhandled notification dropped");
                    }
                }
                None
            }
            JsonRpcMessage::Response(resp) => {
                match self.remove_pending(&resp.id) {
                    Some(tx) => {
                        let outcome = match resp.error {
                            Some(err) => Err(err),
                            None => Ok(resp.result.unwrap_or(Value::Null)),
                        };
                        // The receiver may have timed out concurrently.
                        let _ = tx.send(outcome);
                    }
                    None => {
                        debug!(id = %resp.id, "late or unknown response dropped");
                    }
                }
                None
            }
        }
    }
}
