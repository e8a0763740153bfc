//! Byte-stream and frame adapters carrying JSON-RPC messages.
//!
//! Transports move [`JsonRpcMessage`]s in and out of a connection and carry
//! no protocol semantics of their own. Protocol behaviour lives in the
//! dispatcher a transport is started with.
//!
//! Submodules:
//! - `codec`: newline-delimited framing with a maximum line length.
//! - `stdio`: reader/writer loops over standard input/output.
//! - `ws`: single-tenant WebSocket adapter.
//! - `ws_multi`: multi-tenant WebSocket connection registry.

pub mod codec;
pub mod stdio;
pub mod ws;
pub mod ws_multi;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use self::codec::MAX_LINE_BYTES;
use crate::rpc::envelope::JsonRpcMessage;
use crate::{ConduitError, Result};

/// Hook invoked with transport-level failures.
///
/// Failures reported here are fatal to the owning connection only; they never
/// escape to tear down the process.
pub type ExceptionHandler = Arc<dyn Fn(&ConduitError) + Send + Sync>;

/// Maps one inbound message to an optional immediate outbound message.
///
/// A dispatcher shared across connections (multi-tenant transports) must keep
/// no correlation state of its own; per-connection state belongs to the
/// session owning each connection.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// Handle one inbound message, optionally producing a direct reply.
    async fn dispatch(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage>;
}

/// Transport contract shared by stdio and WebSocket adapters.
///
/// Lifecycle: [`start`](Transport::start) spawns the background reader and
/// writer workers, [`close_gracefully`](Transport::close_gracefully) stops
/// intake and drains queued outbound messages,
/// [`close`](Transport::close) tears the connection down immediately, and
/// [`await_termination`](Transport::await_termination) resolves once on the
/// first of {stream EOF, explicit close, fatal transport error}.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the connection workers, routing inbound messages to `dispatcher`.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] when the transport was already
    /// started or already closed.
    async fn start(&self, dispatcher: Arc<dyn MessageDispatcher>) -> Result<()>;

    /// Enqueue one outbound message.
    ///
    /// Per connection, write order equals enqueue order. Completion means
    /// "accepted by the outbound queue," not "processed by the remote."
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] when the outbound queue has
    /// reached its terminal closed state; the failure is also reported via
    /// the exception hook.
    async fn send_message(&self, message: JsonRpcMessage) -> Result<()>;

    /// Stop accepting new work, drain queued outbound messages, then
    /// terminate. Idempotent.
    async fn close_gracefully(&self);

    /// Terminate immediately; queued outbound messages may be dropped.
    /// Idempotent, also after `close_gracefully`.
    async fn close(&self);

    /// Wait for the one-shot termination signal.
    async fn await_termination(&self);

    /// Install the exception hook for connection-fatal failures.
    fn set_exception_handler(&self, handler: ExceptionHandler);
}

/// Transport tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// Outbound queue capacity per connection.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    /// Maximum accepted inbound line length in bytes (stdio).
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_outbound_capacity() -> usize {
    64
}

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// One-shot termination signal, race-free under concurrent triggers.
///
/// The first [`fire`](TerminationSignal::fire) wins via compare-and-set and
/// cancels the shared token; every later call is a no-op. Connection workers
/// select on [`cancelled`](TerminationSignal::cancelled) so a fired signal
/// also stops the loops.
#[derive(Debug, Default)]
pub struct TerminationSignal {
    fired: AtomicBool,
    token: CancellationToken,
}

impl TerminationSignal {
    /// Create an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` when this call performed the
    /// transition, `false` when it had already fired.
    pub fn fire(&self, reason: &str) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(reason, "transport terminated");
            self.token.cancel();
            true
        } else {
            false
        }
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait until the signal fires; resolves immediately if it already has.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Token cancelled when the signal fires, for worker select loops.
    #[must_use]
    pub fn cancelled(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Installable exception-hook slot shared by the transport implementations.
#[derive(Default)]
pub struct ExceptionHook {
    slot: Mutex<Option<ExceptionHandler>>,
}

impl ExceptionHook {
    /// Create an empty hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the handler.
    pub fn set(&self, handler: ExceptionHandler) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Report a connection-fatal failure to the installed handler, if any.
    pub fn report(&self, error: &ConduitError) {
        let handler = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(error);
        } else {
            debug!(error = %error, "transport failure with no exception handler installed");
        }
    }
}
