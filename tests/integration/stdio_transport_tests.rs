//! Stdio transport behaviour over an in-memory stream pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_conduit::rpc::envelope::{codes, JsonRpcMessage, RequestId};
use agent_conduit::transport::{MessageDispatcher, Transport, TransportConfig};
use agent_conduit::ConduitError;
use async_trait::async_trait;
use serde_json::json;

use super::test_helpers::stdio_pair;

/// Echoes request params back as the result; ignores everything else.
struct EchoDispatcher {
    requests_seen: AtomicUsize,
}

impl EchoDispatcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests_seen: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MessageDispatcher for EchoDispatcher {
    async fn dispatch(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(req) => {
                self.requests_seen.fetch_add(1, Ordering::SeqCst);
                Some(JsonRpcMessage::Response(
                    agent_conduit::rpc::envelope::JsonRpcResponse::success(
                        req.id,
                        req.params.unwrap_or(json!(null)),
                    ),
                ))
            }
            _ => None,
        }
    }
}

#[tokio::test]
async fn request_line_produces_exactly_one_response_line() {
    let (transport, mut peer) = stdio_pair(TransportConfig::default());
    transport.start(EchoDispatcher::new()).await.unwrap();

    peer.send_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"x":1}}"#)
        .await;

    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => {
            assert_eq!(resp.id, RequestId::Number(1));
            assert_eq!(resp.result, Some(json!({"x": 1})));
            assert!(resp.error.is_none());
        }
        other => panic!("expected response, got {other:?}"),
    }
}

#[tokio::test]
async fn outbound_messages_preserve_enqueue_order() {
    let (transport, mut peer) = stdio_pair(TransportConfig::default());
    transport.start(EchoDispatcher::new()).await.unwrap();

    for i in 0..5 {
        transport
            .send_message(JsonRpcMessage::notification("tick", Some(json!({"n": i}))))
            .await
            .unwrap();
    }
    for i in 0..5 {
        match peer.recv_message().await {
            JsonRpcMessage::Notification(note) => {
                assert_eq!(note.params, Some(json!({"n": i})));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn embedded_line_breaks_are_escaped_into_one_line() {
    let (transport, mut peer) = stdio_pair(TransportConfig::default());
    transport.start(EchoDispatcher::new()).await.unwrap();

    transport
        .send_message(JsonRpcMessage::notification(
            "log",
            Some(json!({"text": "first\nsecond"})),
        ))
        .await
        .unwrap();

    let line = peer.recv_line().await.expect("one full line");
    assert!(line.contains("first"));
    assert!(line.contains("second"));
}

#[tokio::test]
async fn shape_invalid_json_gets_invalid_request_reply_and_stream_survives() {
    let (transport, mut peer) = stdio_pair(TransportConfig::default());
    let dispatcher = EchoDispatcher::new();
    transport
        .start(Arc::clone(&dispatcher) as Arc<dyn MessageDispatcher>)
        .await
        .unwrap();

    // Valid JSON, no recognizable envelope shape, but an id to answer to.
    peer.send_line(r#"{"jsonrpc":"2.0","id":7}"#).await;
    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => {
            assert_eq!(resp.id, RequestId::Number(7));
            assert_eq!(resp.error.map(|e| e.code), Some(codes::INVALID_REQUEST));
        }
        other => panic!("expected error response, got {other:?}"),
    }

    // The stream keeps dispatching afterwards.
    peer.send_line(r#"{"jsonrpc":"2.0","id":8,"method":"ping"}"#)
        .await;
    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => assert_eq!(resp.id, RequestId::Number(8)),
        other => panic!("expected response, got {other:?}"),
    }
    assert_eq!(dispatcher.requests_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_json_terminates_the_transport() {
    let (transport, mut peer) = stdio_pair(TransportConfig::default());
    let reported = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reported);
    transport.set_exception_handler(Arc::new(move |err: &ConduitError| {
        if matches!(err, ConduitError::Frame(_)) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));
    transport.start(EchoDispatcher::new()).await.unwrap();

    peer.send_line("{definitely not json").await;
    transport.await_termination().await;
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn eof_terminates_the_transport() {
    let (transport, peer) = stdio_pair(TransportConfig::default());
    transport.start(EchoDispatcher::new()).await.unwrap();

    peer.close();
    transport.await_termination().await;
}

#[tokio::test]
async fn oversized_line_terminates_the_transport_and_is_reported() {
    let config = TransportConfig {
        max_line_bytes: 64,
        ..TransportConfig::default()
    };
    let (transport, mut peer) = stdio_pair(config);
    let reported = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reported);
    transport.set_exception_handler(Arc::new(move |err: &ConduitError| {
        if matches!(err, ConduitError::Frame(_)) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));
    transport.start(EchoDispatcher::new()).await.unwrap();

    let long = "x".repeat(256);
    peer.send_line(&format!(r#"{{"pad":"{long}"}}"#)).await;
    transport.await_termination().await;
    assert_eq!(reported.load(Ordering::SeqCst), 1);

    // The connection is gone; later sends fail with a transport error.
    let err = transport
        .send_message(JsonRpcMessage::notification("tick", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::Transport(_)));
}

#[tokio::test]
async fn send_before_start_fails() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    let err = transport
        .send_message(JsonRpcMessage::notification("tick", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::Transport(_)));
}

#[tokio::test]
async fn double_start_fails() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    transport.start(EchoDispatcher::new()).await.unwrap();
    assert!(transport.start(EchoDispatcher::new()).await.is_err());
}
