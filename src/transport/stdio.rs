//! Stdio transport: newline-delimited JSON-RPC over standard input/output.
//!
//! One reader loop decodes inbound lines through [`FrameCodec`] and hands
//! each message to the dispatcher; one writer loop drains a bounded outbound
//! queue to the output stream. Both loops run as background tasks that do not
//! themselves keep the process alive — they end with the runtime.
//!
//! The transport is generic over the stream pair so tests can drive it with
//! [`tokio::io::duplex`] instead of real stdio.
//!
//! Termination (signalled exactly once) happens on the first of:
//! - EOF on the input stream,
//! - an invalid-JSON or oversized line (framing failure),
//! - an I/O error on either stream,
//! - explicit [`close`](Transport::close) /
//!   [`close_gracefully`](Transport::close_gracefully).
//!
//! A line that is valid JSON but not a valid envelope shape is answered with
//! an `INVALID_REQUEST` error response (when an id is present) and the stream
//! continues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::{escape_line_breaks, FrameCodec};
use super::{
    ExceptionHandler, ExceptionHook, MessageDispatcher, TerminationSignal, Transport,
    TransportConfig,
};
use crate::rpc::envelope::{self, DecodeError, JsonRpcMessage, JsonRpcResponse, RpcError};
use crate::{ConduitError, Result};

/// Stdio transport over an arbitrary `AsyncRead`/`AsyncWrite` pair.
pub struct StdioTransport<R, W> {
    streams: Mutex<Option<(R, W)>>,
    outbound: Mutex<Option<mpsc::Sender<JsonRpcMessage>>>,
    started: AtomicBool,
    intake: CancellationToken,
    termination: Arc<TerminationSignal>,
    hook: Arc<ExceptionHook>,
    config: TransportConfig,
}

impl StdioTransport<Stdin, Stdout> {
    /// Transport over the process's standard input/output.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self::from_streams(tokio::io::stdin(), tokio::io::stdout(), config)
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Transport over an explicit stream pair.
    #[must_use]
    pub fn from_streams(reader: R, writer: W, config: TransportConfig) -> Self {
        Self {
            streams: Mutex::new(Some((reader, writer))),
            outbound: Mutex::new(None),
            started: AtomicBool::new(false),
            intake: CancellationToken::new(),
            termination: Arc::new(TerminationSignal::new()),
            hook: Arc::new(ExceptionHook::new()),
            config,
        }
    }

    fn take_streams(&self) -> Option<(R, W)> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
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
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn start(&self, dispatcher: Arc<dyn MessageDispatcher>) -> Result<()> {
        let Some((reader, writer)) = self.take_streams() else {
            return Err(ConduitError::Transport(
                "stdio transport already started".into(),
            ));
        };

        let (tx, rx) = mpsc::channel(self.config.outbound_capacity);
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx.clone());
        self.started.store(true, Ordering::SeqCst);

        tokio::spawn(run_reader(
            reader,
            dispatcher,
            tx,
            self.config.max_line_bytes,
            self.intake.clone(),
            Arc::clone(&self.termination),
            Arc::clone(&self.hook),
        ));
        tokio::spawn(run_writer(
            writer,
            rx,
            Arc::clone(&self.termination),
            Arc::clone(&self.hook),
        ));

        debug!("stdio transport started");
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
                "stdio transport is not accepting outbound messages".into(),
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
        // Stop intake and close the queue; the writer fires termination once
        // the queue is drained.
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

/// Reader loop: decode newline-delimited messages and dispatch each one.
async fn run_reader<R>(
    reader: R,
    dispatcher: Arc<dyn MessageDispatcher>,
    reply_tx: mpsc::Sender<JsonRpcMessage>,
    max_line_bytes: usize,
    intake: CancellationToken,
    termination: Arc<TerminationSignal>,
    hook: Arc<ExceptionHook>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(reader, FrameCodec::with_max_length(max_line_bytes));
    let cancel = termination.cancelled();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdio reader: termination signalled, stopping");
                break;
            }

            () = intake.cancelled() => {
                debug!("stdio reader: intake closed, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("stdio reader: EOF detected");
                        termination.fire("stream closed");
                        break;
                    }

                    Some(Err(err)) => {
                        // FramedRead yields no further items after a decode
                        // error, so an oversized line is fatal like an I/O
                        // failure.
                        hook.report(&err);
                        warn!(error = %err, "stdio reader: fatal framing error");
                        termination.fire("framing error");
                        break;
                    }

                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !handle_line(&line, &dispatcher, &reply_tx, &termination, &hook).await {
                            break;
                        }
                    }
                }
            }
        }
    }
    // Dropping reply_tx here lets the writer drain and terminate.
}

/// Dispatch one decoded line. Returns `false` when the reader must stop.
async fn handle_line(
    line: &str,
    dispatcher: &Arc<dyn MessageDispatcher>,
    reply_tx: &mpsc::Sender<JsonRpcMessage>,
    termination: &TerminationSignal,
    hook: &ExceptionHook,
) -> bool {
    match envelope::decode(line) {
        Ok(message) => {
            if let Some(reply) = dispatcher.dispatch(message).await {
                if reply_tx.send(reply).await.is_err() {
                    debug!("stdio reader: outbound queue closed, stopping");
                    return false;
                }
            }
            true
        }
        Err(DecodeError::Parse(detail)) => {
            let err = ConduitError::Frame(format!("malformed json: {detail}"));
            hook.report(&err);
            termination.fire("parse failure");
            false
        }
        Err(DecodeError::InvalidShape { id, detail }) => {
            warn!(detail = detail.as_str(), "stdio reader: invalid envelope shape");
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

/// Writer loop: serialise outbound messages and append the `\n` delimiter.
async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<JsonRpcMessage>,
    termination: Arc<TerminationSignal>,
    hook: Arc<ExceptionHook>,
) where
    W: AsyncWrite + Unpin + Send,
{
    let cancel = termination.cancelled();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdio writer: termination signalled, stopping");
                break;
            }

            msg = rx.recv() => {
                match msg {
                    None => {
                        debug!("stdio writer: outbound queue drained, stopping");
                        termination.fire("outbound drained");
                        break;
                    }
                    Some(message) => {
                        let mut bytes = escape_line_breaks(message.encode()).into_bytes();
                        bytes.push(b'\n');
                        if let Err(e) = writer.write_all(&bytes).await {
                            let err = ConduitError::Transport(format!("write failed: {e}"));
                            hook.report(&err);
                            termination.fire("write failed");
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            let err = ConduitError::Transport(format!("flush failed: {e}"));
                            hook.report(&err);
                            termination.fire("flush failed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
