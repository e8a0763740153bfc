//! Shutdown semantics: drain on graceful close, idempotence, one-shot signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_conduit::rpc::envelope::JsonRpcMessage;
use agent_conduit::transport::{MessageDispatcher, TerminationSignal, Transport, TransportConfig};
use async_trait::async_trait;
use serde_json::json;

use super::test_helpers::stdio_pair;

struct NullDispatcher;

#[async_trait]
impl MessageDispatcher for NullDispatcher {
    async fn dispatch(&self, _message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        None
    }
}

#[tokio::test]
async fn graceful_close_drains_queued_outbound_messages() {
    let (transport, mut peer) = stdio_pair(TransportConfig::default());
    transport.start(Arc::new(NullDispatcher)).await.unwrap();

    for i in 0..10 {
        transport
            .send_message(JsonRpcMessage::notification("tick", Some(json!({"n": i}))))
            .await
            .unwrap();
    }
    transport.close_gracefully().await;

    for i in 0..10 {
        match peer.recv_message().await {
            JsonRpcMessage::Notification(note) => {
                assert_eq!(note.params, Some(json!({"n": i})));
            }
            other => panic!("expected drained notification, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn graceful_close_twice_never_raises() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    transport.start(Arc::new(NullDispatcher)).await.unwrap();

    transport.close_gracefully().await;
    transport.close_gracefully().await;
}

#[tokio::test]
async fn close_after_graceful_close_never_raises() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    transport.start(Arc::new(NullDispatcher)).await.unwrap();

    transport.close_gracefully().await;
    transport.close().await;
    transport.await_termination().await;
}

#[tokio::test]
async fn graceful_close_without_start_terminates() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    transport.close_gracefully().await;
    transport.await_termination().await;
}

#[tokio::test]
async fn send_after_close_fails() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    transport.start(Arc::new(NullDispatcher)).await.unwrap();
    transport.close().await;

    assert!(transport
        .send_message(JsonRpcMessage::notification("tick", None))
        .await
        .is_err());
}

#[tokio::test]
async fn termination_signal_fires_exactly_once_under_concurrent_triggers() {
    let signal = Arc::new(TerminationSignal::new());
    let fired = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..8 {
        let signal = Arc::clone(&signal);
        let fired = Arc::clone(&fired);
        handles.push(tokio::spawn(async move {
            if signal.fire(&format!("trigger {i}")) {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(signal.is_terminated());
    signal.wait().await;
}

#[tokio::test]
async fn await_termination_wakes_every_waiter() {
    let (transport, _peer) = stdio_pair(TransportConfig::default());
    transport.start(Arc::new(NullDispatcher)).await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let transport = Arc::clone(&transport);
        waiters.push(tokio::spawn(async move {
            transport.await_termination().await;
        }));
    }

    transport.close().await;
    for waiter in waiters {
        waiter.await.unwrap();
    }
}
