//! Shared transport fixtures for the integration tests.
//!
//! Provides an in-memory stdio pair driven over [`tokio::io::duplex`] and a
//! channel-backed WebSocket fake, so transport and protocol behaviour can be
//! exercised without real stdio or a listening HTTP server.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use agent_conduit::rpc::envelope::{self, JsonRpcMessage};
use agent_conduit::transport::stdio::StdioTransport;
use agent_conduit::transport::TransportConfig;
use axum::extract::ws::Message as WsMessage;
use futures_util::{Sink, Stream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

/// How long test clients wait for one line or frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-writer subscriber once, honouring `RUST_LOG`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // try_init fails once a subscriber is set; later calls are no-ops.
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

/// Stdio transport wired to an in-memory peer.
pub type DuplexStdioTransport = StdioTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// The peer end of an in-memory stdio pair.
pub struct DuplexPeer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl DuplexPeer {
    /// Write one `\n`-terminated line into the transport's input.
    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("peer write");
        self.writer.write_all(b"\n").await.expect("peer delimiter");
        self.writer.flush().await.expect("peer flush");
    }

    /// Read one line of transport output; `None` on EOF.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("peer read timed out")
            .expect("peer read");
        if read == 0 {
            return None;
        }
        Some(line.trim_end_matches('\n').to_owned())
    }

    /// Read and decode one message of transport output.
    pub async fn recv_message(&mut self) -> JsonRpcMessage {
        let line = self.recv_line().await.expect("peer expected a message");
        envelope::decode(&line).expect("peer expected a valid envelope")
    }

    /// Close the transport's input stream, producing EOF on its reader.
    pub fn close(self) {
        drop(self);
    }
}

/// Build a started-ready stdio transport plus its in-memory peer.
pub fn stdio_pair(config: TransportConfig) -> (Arc<DuplexStdioTransport>, DuplexPeer) {
    init_tracing();
    let (server_side, peer_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (peer_read, peer_write) = tokio::io::split(peer_side);

    let transport = Arc::new(StdioTransport::from_streams(
        server_read,
        server_write,
        config,
    ));
    let peer = DuplexPeer {
        reader: BufReader::new(peer_read),
        writer: peer_write,
    };
    (transport, peer)
}

// ── WebSocket fake ────────────────────────────────────────────────────────────

/// Channel-backed socket satisfying the transport's socket bound.
pub struct FakeSocket {
    incoming: mpsc::UnboundedReceiver<Result<WsMessage, axum::Error>>,
    outgoing: mpsc::UnboundedSender<WsMessage>,
}

/// Test-side handle driving a [`FakeSocket`].
pub struct FakePeer {
    to_socket: mpsc::UnboundedSender<Result<WsMessage, axum::Error>>,
    from_socket: mpsc::UnboundedReceiver<WsMessage>,
}

impl FakePeer {
    /// Deliver one text frame to the transport.
    pub fn send_text(&self, text: &str) {
        self.to_socket
            .send(Ok(WsMessage::Text(text.to_owned().into())))
            .expect("fake socket closed");
    }

    /// Deliver a close frame to the transport.
    pub fn send_close(&self) {
        self.to_socket
            .send(Ok(WsMessage::Close(None)))
            .expect("fake socket closed");
    }

    /// Receive one text frame written by the transport; `None` once the sink
    /// side is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.from_socket.recv())
                .await
                .expect("fake peer recv timed out")?;
            match frame {
                WsMessage::Text(text) => return Some(text.as_str().to_owned()),
                // The writer may close the sink with a final close frame.
                _ => continue,
            }
        }
    }

    /// Receive and decode one message written by the transport.
    pub async fn recv_message(&mut self) -> JsonRpcMessage {
        let text = self.recv_text().await.expect("fake peer expected a frame");
        envelope::decode(&text).expect("fake peer expected a valid envelope")
    }

    /// End the inbound stream, as a dropped connection would.
    pub fn disconnect(self) {
        drop(self);
    }
}

/// Build a fake socket plus the peer handle driving it.
pub fn fake_socket() -> (FakeSocket, FakePeer) {
    init_tracing();
    let (to_socket, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_socket) = mpsc::unbounded_channel();
    (
        FakeSocket { incoming, outgoing },
        FakePeer {
            to_socket,
            from_socket,
        },
    )
}

impl Stream for FakeSocket {
    type Item = Result<WsMessage, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<WsMessage> for FakeSocket {
    type Error = axum::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        self.outgoing.send(item).map_err(|_| {
            axum::Error::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "fake socket peer gone",
            ))
        })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
