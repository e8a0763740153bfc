//! Multi-tenant WebSocket transport: routing and per-connection isolation.

use std::sync::Arc;

use agent_conduit::rpc::envelope::{JsonRpcMessage, JsonRpcResponse};
use agent_conduit::transport::ws_multi::MultiTenantWsTransport;
use agent_conduit::transport::{MessageDispatcher, Transport, TransportConfig};
use async_trait::async_trait;
use serde_json::json;

use super::test_helpers::{fake_socket, FakePeer, FakeSocket};

/// Stateless dispatcher shared by every connection.
struct PingDispatcher;

#[async_trait]
impl MessageDispatcher for PingDispatcher {
    async fn dispatch(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(req) => Some(JsonRpcMessage::Response(
                JsonRpcResponse::success(req.id, json!({})),
            )),
            _ => None,
        }
    }
}

fn started_registry() -> MultiTenantWsTransport<FakeSocket> {
    let registry = MultiTenantWsTransport::new(TransportConfig::default());
    registry.start(Arc::new(PingDispatcher)).unwrap();
    registry
}

async fn accept_peer(
    registry: &MultiTenantWsTransport<FakeSocket>,
) -> (uuid::Uuid, FakePeer) {
    let (socket, peer) = fake_socket();
    let conn_id = registry.accept(socket).await.unwrap();
    (conn_id, peer)
}

#[tokio::test]
async fn send_to_reaches_only_the_addressed_connection() {
    let registry = started_registry();
    let (conn_a, mut peer_a) = accept_peer(&registry).await;
    let (_conn_b, mut peer_b) = accept_peer(&registry).await;

    registry
        .send_to(
            conn_a,
            JsonRpcMessage::notification("tick", Some(json!({"for": "a"}))),
        )
        .await
        .unwrap();

    let frame = peer_a.recv_text().await.expect("a gets the frame");
    assert!(frame.contains(r#""for":"a""#));

    // B must stay silent; its own request proves the channel is empty of
    // anything but the reply.
    peer_b.send_text(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    match peer_b.recv_message().await {
        JsonRpcMessage::Response(resp) => assert!(resp.error.is_none()),
        other => panic!("expected b's own reply, got {other:?}"),
    }
}

#[tokio::test]
async fn connections_dispatch_through_the_shared_dispatcher() {
    let registry = started_registry();
    let (_a, mut peer_a) = accept_peer(&registry).await;
    let (_b, mut peer_b) = accept_peer(&registry).await;

    peer_a.send_text(r#"{"jsonrpc":"2.0","id":10,"method":"ping"}"#);
    peer_b.send_text(r#"{"jsonrpc":"2.0","id":20,"method":"ping"}"#);

    assert!(matches!(
        peer_a.recv_message().await,
        JsonRpcMessage::Response(_)
    ));
    assert!(matches!(
        peer_b.recv_message().await,
        JsonRpcMessage::Response(_)
    ));
}

#[tokio::test]
async fn one_dropped_connection_leaves_the_others_working() {
    let registry = started_registry();
    let (conn_a, peer_a) = accept_peer(&registry).await;
    let (_b, mut peer_b) = accept_peer(&registry).await;
    assert_eq!(registry.connection_count().await, 2);

    let conn = registry.connection(conn_a).await.unwrap();
    peer_a.disconnect();
    conn.await_termination().await;

    peer_b.send_text(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    assert!(matches!(
        peer_b.recv_message().await,
        JsonRpcMessage::Response(_)
    ));
}

#[tokio::test]
async fn terminated_connection_is_reaped_from_the_registry() {
    let registry = started_registry();
    let (conn_a, peer_a) = accept_peer(&registry).await;

    let conn = registry.connection(conn_a).await.unwrap();
    peer_a.disconnect();
    conn.await_termination().await;

    // The reaper runs as its own task; poll until it has removed the entry.
    for _ in 0..50 {
        if registry.connection_count().await == 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("terminated connection was never reaped");
}

#[tokio::test]
async fn close_frame_terminates_only_its_connection() {
    let registry = started_registry();
    let (conn_a, peer_a) = accept_peer(&registry).await;
    let (conn_b, _peer_b) = accept_peer(&registry).await;

    let conn = registry.connection(conn_a).await.unwrap();
    peer_a.send_close();
    conn.await_termination().await;

    assert!(registry.connection(conn_b).await.is_ok());
}

#[tokio::test]
async fn close_connection_removes_the_entry() {
    let registry = started_registry();
    let (conn_a, _peer_a) = accept_peer(&registry).await;

    registry.close_connection(conn_a).await.unwrap();
    assert_eq!(registry.connection_count().await, 0);
    assert!(registry.send_to(conn_a, JsonRpcMessage::notification("tick", None)).await.is_err());
}

#[tokio::test]
async fn global_shutdown_disposes_every_connection() {
    let registry = started_registry();
    let (_a, _peer_a) = accept_peer(&registry).await;
    let (_b, _peer_b) = accept_peer(&registry).await;

    registry.close_gracefully().await;
    assert_eq!(registry.connection_count().await, 0);
    registry.await_termination().await;

    // Shut down registries refuse new sockets.
    let (socket, _peer) = fake_socket();
    assert!(registry.accept(socket).await.is_err());
}

#[tokio::test]
async fn accept_before_start_fails() {
    let registry: MultiTenantWsTransport<FakeSocket> =
        MultiTenantWsTransport::new(TransportConfig::default());
    let (socket, _peer) = fake_socket();
    assert!(registry.accept(socket).await.is_err());
}
