//! Single-tenant WebSocket transport.
//!
//! Adapts one upgraded WebSocket connection (the hosting HTTP server — axum —
//! performs the upgrade) to the [`Transport`] contract. The socket is split
//! into a receive half driven by the reader loop and a send half owned by a
//! dedicated writer worker, so all outbound writes on the connection are
//! serialized in enqueue order.
//!
//! Termination (signalled exactly once) happens on the first of: remote
//! close frame, local close, or a transport error. A text frame that is not
//! valid JSON is reported through the exception hook and the connection
//! continues; a frame with a shape-invalid envelope is answered with an
//! `INVALID_REQUEST` error response when an id is present.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    ExceptionHandler, ExceptionHook, MessageDispatcher, TerminationSignal, Transport,
    TransportConfig,
};
use crate::rpc::envelope::{self, DecodeError, JsonRpcMessage, JsonRpcResponse, RpcError};
use crate::{ConduitError, Result};

/// Socket bound for use by the WebSocket transports.
///
/// Implemented by [`axum::extract::ws::WebSocket`]; tests implement it over
/// channel-backed fakes.
pub trait WsSocket:
    Stream<Item = std::result::Result<WsMessage, axum::Error>>
    + Sink<WsMessage, Error = axum::Error>
    + Send
    + Unpin
    + 'static
{
}

impl<S> WsSocket for S where
    S: Stream<Item = std::result::Result<WsMessage, axum::Error>>
        + Sink<WsMessage, Error = axum::Error>
        + Send
        + Unpin
        + 'static
{
}

/// Transport over a real upgraded axum WebSocket.
pub type WebSocketTransport = WsTransport<WebSocket>;

/// Single-tenant WebSocket transport over any [`WsSocket`].
pub struct WsTransport<S> {
    socket: Mutex<Option<S>>,
    outbound: Mutex<Option<mpsc::Sender<JsonRpcMessage>>>,
    started: AtomicBool,
    intake: CancellationToken,
    termination: Arc<TerminationSignal>,
    hook: Arc<ExceptionHook>,
    config: TransportConfig,
}

impl<S: WsSocket> WsTransport<S> {
    /// Wrap one upgraded socket.
    #[must_use]
    pub fn new(socket: S, config: TransportConfig) -> Self {
        Self {
            socket: Mutex::new(Some(socket)),
            outbound: Mutex::new(None),
            started: AtomicBool::new(false),
            intake: CancellationToken::new(),
            termination: Arc::new(TerminationSignal::new()),
            hook: Arc::new(ExceptionHook::new()),
            config,
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<JsonRpcMessage>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn drop_sender(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[async_trait]
impl<S: WsSocket> Transport for WsTransport<S> {
    async fn start(&self, dispatcher: Arc<dyn MessageDispatcher>) -> Result<()> {
        let Some(socket) = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(ConduitError::Transport(
                "websocket transport already started".into(),
            ));
        };

        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity);
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx.clone());
        self.started.store(true, Ordering::SeqCst);

        tokio::spawn(run_reader(
            stream,
            dispatcher,
            tx,
            self.intake.clone(),
            Arc::clone(&self.termination),
            Arc::clone(&self.hook),
        ));
        tokio::spawn(run_writer(
            sink,
            rx,
            Arc::clone(&self.termination),
            Arc::clone(&self.hook),
        ));

        debug!("websocket transport started");
        Ok(())
    }

    async fn send_message(&self, message: JsonRpcMessage) -> Result<()> {
        if self.termination.is_terminated() {
            return Err(ConduitError::Transport(
                "outbound queue reached terminal state".into(),
            ));
        }
        let Some(tx) = self.sender() else {
            return Err(ConduitError::Transport(
                "websocket transport is not accepting outbound messages".into(),
            ));
        };
        if tx.send(message).await.is_err() {
            let err = ConduitError::Transport("outbound queue reached terminal state".into());
            self.hook.report(&err);
            self.termination.fire("outbound queue closed");
            return Err(err);
        }
        Ok(())
    }

    async fn close_gracefully(&self) {
        self.intake.cancel();
        self.drop_sender();
        if self.started.load(Ordering::SeqCst) {
            self.termination.wait().await;
        } else {
            self.termination.fire("closed before start");
        }
    }

    async fn close(&self) {
        self.drop_sender();
        self.termination.fire("explicit close");
    }

    async fn await_termination(&self) {
        self.termination.wait().await;
    }

    fn set_exception_handler(&self, handler: ExceptionHandler) {
        self.hook.set(handler);
    }
}

// ── Worker loops ──────────────────────────────────────────────────────────────

/// Reader loop: decode text frames and dispatch each message.
async fn run_reader<S: WsSocket>(
    mut stream: SplitStream<S>,
    dispatcher: Arc<dyn MessageDispatcher>,
    reply_tx: mpsc::Sender<JsonRpcMessage>,
    intake: CancellationToken,
    termination: Arc<TerminationSignal>,
    hook: Arc<ExceptionHook>,
) {
    let cancel = termination.cancelled();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("ws reader: termination signalled, stopping");
                break;
            }

            () = intake.cancelled() => {
                debug!("ws reader: intake closed, stopping");
                break;
            }

            frame = stream.next() => {
                match frame {
                    None => {
                        debug!("ws reader: stream ended");
                        termination.fire("stream closed");
                        break;
                    }
                    Some(Err(e)) => {
                        let err = ConduitError::Transport(format!("websocket error: {e}"));
                        hook.report(&err);
                        termination.fire("websocket error");
                        break;
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("ws reader: close frame received");
                        termination.fire("remote close");
                        break;
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        if !handle_frame(text.as_str(), &dispatcher, &reply_tx, &hook).await {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Binary/ping/pong frames carry no protocol payload.
                    }
                }
            }
        }
    }
}

/// Dispatch one text frame. Returns `false` when the reader must stop.
async fn handle_frame(
    text: &str,
    dispatcher: &Arc<dyn MessageDispatcher>,
    reply_tx: &mpsc::Sender<JsonRpcMessage>,
    hook: &ExceptionHook,
) -> bool {
    match envelope::decode(text) {
        Ok(message) => {
            if let Some(reply) = dispatcher.dispatch(message).await {
                if reply_tx.send(reply).await.is_err() {
                    debug!("ws reader: outbound queue closed, stopping");
                    return false;
                }
            }
            true
        }
        Err(DecodeError::Parse(detail)) => {
            hook.report(&ConduitError::Frame(format!("malformed json: {detail}")));
            warn!(detail = detail.as_str(), "ws reader: malformed frame skipped");
            true
        }
        Err(DecodeError::InvalidShape { id, detail }) => {
            warn!(detail = detail.as_str(), "ws reader: invalid envelope shape");
            if let Some(id) = id {
                let reply = JsonRpcMessage::Response(JsonRpcResponse::failure(
                    id,
                    RpcError::invalid_request(detail),
                ));
                if reply_tx.send(reply).await.is_err() {
                    return false;
                }
            }
            true
        }
    }
}

/// Writer worker: serialise outbound messages into text frames.
async fn run_writer<S: WsSocket>(
    mut sink: SplitSink<S, WsMessage>,
    mut rx: mpsc::Receiver<JsonRpcMessage>,
    termination: Arc<TerminationSignal>,
    hook: Arc<ExceptionHook>,
) {
    let cancel = termination.cancelled();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("ws writer: termination signalled, stopping");
                break;
            }

            msg = rx.recv() => {
                match msg {
                    None => {
                        debug!("ws writer: outbound queue drained, stopping");
                        let _ = sink.close().await;
                        termination.fire("outbound drained");
                        break;
                    }
                    Some(message) => {
                        let text = message.encode();
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            let err = ConduitError::Transport(format!("send failed: {e}"));
                            hook.report(&err);
                            termination.fire("send failed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
