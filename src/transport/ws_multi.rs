//! Multi-tenant WebSocket transport.
//!
//! Tracks one [`WsTransport`] per physical connection in a registry keyed by
//! connection identity. Every connection is started with the same shared
//! dispatcher, which must keep no correlation state of its own — per
//! connection state belongs to the session owning that connection.
//!
//! Each connection keeps its own inbound/outbound channel pair and writer
//! worker, so a failure — or an explicit close — on one connection never
//! affects another. Global shutdown disposes every tracked connection and
//! clears the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::ws::{WsSocket, WsTransport};
use super::{
    ExceptionHandler, ExceptionHook, MessageDispatcher, TerminationSignal, Transport,
    TransportConfig,
};
use crate::rpc::envelope::JsonRpcMessage;
use crate::{ConduitError, Result};

/// Registry of per-connection WebSocket transports behind one endpoint.
pub struct MultiTenantWsTransport<S> {
    connections: Arc<Mutex<HashMap<Uuid, Arc<WsTransport<S>>>>>,
    dispatcher: StdMutex<Option<Arc<dyn MessageDispatcher>>>,
    closed: AtomicBool,
    termination: TerminationSignal,
    hook: Arc<ExceptionHook>,
    config: TransportConfig,
}

impl<S: WsSocket> MultiTenantWsTransport<S> {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: StdMutex::new(None),
            closed: AtomicBool::new(false),
            termination: TerminationSignal::new(),
            hook: Arc::new(ExceptionHook::new()),
            config,
        }
    }

    /// Install the shared dispatcher reused by every accepted connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] when a dispatcher is already
    /// installed.
    pub fn start(&self, dispatcher: Arc<dyn MessageDispatcher>) -> Result<()> {
        let mut slot = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ConduitError::Transport(
                "multi-tenant transport already started".into(),
            ));
        }
        *slot = Some(dispatcher);
        Ok(())
    }

    /// Accept one upgraded socket, returning its connection identity.
    ///
    /// The connection is tracked until it terminates (for any reason), at
    /// which point it is removed from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] when the transport has not been
    /// started, is shut down, or the per-connection start fails.
    pub async fn accept(&self, socket: S) -> Result<Uuid> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConduitError::Transport(
                "multi-tenant transport is shut down".into(),
            ));
        }
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                ConduitError::Transport("multi-tenant transport not started".into())
            })?;

        let conn_id = Uuid::new_v4();
        let conn = Arc::new(WsTransport::new(socket, self.config.clone()));

        // Per-connection failures surface through the shared hook but stay
        // fatal to their own connection only.
        let hook = Arc::clone(&self.hook);
        conn.set_exception_handler(Arc::new(move |err| hook.report(err)));
        conn.start(dispatcher).await?;

        self.connections.lock().await.insert(conn_id, Arc::clone(&conn));
        info!(conn = %conn_id, "websocket connection accepted");

        // Reap the registry entry when the connection terminates.
        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            conn.await_termination().await;
            if connections.lock().await.remove(&conn_id).is_some() {
                debug!(conn = %conn_id, "websocket connection reaped");
            }
        });

        Ok(conn_id)
    }

    /// Enqueue a message on one connection's outbound channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] for an unknown connection or a
    /// closed outbound queue.
    pub async fn send_to(&self, conn_id: Uuid, message: JsonRpcMessage) -> Result<()> {
        let conn = self.connection(conn_id).await?;
        conn.send_message(message).await
    }

    /// Close one connection immediately, removing it from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] for an unknown connection.
    pub async fn close_connection(&self, conn_id: Uuid) -> Result<()> {
        let conn = self.connections.lock().await.remove(&conn_id).ok_or_else(|| {
            ConduitError::Transport(format!("unknown connection: {conn_id}"))
        })?;
        conn.close().await;
        debug!(conn = %conn_id, "websocket connection closed");
        Ok(())
    }

    /// Look up a tracked connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] for an unknown connection.
    pub async fn connection(&self, conn_id: Uuid) -> Result<Arc<WsTransport<S>>> {
        self.connections
            .lock()
            .await
            .get(&conn_id)
            .cloned()
            .ok_or_else(|| ConduitError::Transport(format!("unknown connection: {conn_id}")))
    }

    /// Number of currently tracked connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Drain every connection gracefully, clear the registry, terminate.
    pub async fn close_gracefully(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.connections.lock().await.drain().collect();
        for (conn_id, conn) in drained {
            conn.close_gracefully().await;
            debug!(conn = %conn_id, "websocket connection drained");
        }
        self.termination.fire("global graceful shutdown");
    }

    /// Close every connection immediately, clear the registry, terminate.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.connections.lock().await.drain().collect();
        for (_, conn) in drained {
            conn.close().await;
        }
        self.termination.fire("global close");
    }

    /// Wait for the global termination signal.
    pub async fn await_termination(&self) {
        self.termination.wait().await;
    }

    /// Install the exception hook receiving failures from every connection.
    pub fn set_exception_handler(&self, handler: ExceptionHandler) {
        self.hook.set(handler);
    }
}
