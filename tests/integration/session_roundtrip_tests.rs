//! Session correlation behaviour: pending table, timeouts, dispatch.

use std::sync::Arc;

use agent_conduit::rpc::envelope::{codes, JsonRpcMessage, RequestId, RpcError};
use agent_conduit::session::{Session, SessionConfig};
use agent_conduit::transport::{Transport, TransportConfig};
use agent_conduit::worker::TokioPool;
use agent_conduit::ConduitError;
use serde_json::{json, Value};

use super::test_helpers::stdio_pair;

fn test_session(timeout_seconds: u64) -> Arc<Session> {
    Session::new(
        SessionConfig {
            request_timeout_seconds: timeout_seconds,
        },
        Arc::new(TokioPool),
    )
}

async fn attach(session: &Arc<Session>) -> super::test_helpers::DuplexPeer {
    let (transport, peer) = stdio_pair(TransportConfig::default());
    transport
        .start(Arc::clone(session) as Arc<dyn agent_conduit::transport::MessageDispatcher>)
        .await
        .unwrap();
    session.attach(transport);
    peer
}

#[tokio::test]
async fn request_resolves_with_the_matching_response() {
    let session = test_session(5);
    let mut peer = attach(&session).await;

    let session_task = Arc::clone(&session);
    let call = tokio::spawn(async move {
        session_task
            .send_request::<Value>("session/new", Some(json!({"cwd": "/work"})))
            .await
    });

    let id = match peer.recv_message().await {
        JsonRpcMessage::Request(req) => {
            assert_eq!(req.method, "session/new");
            req.id
        }
        other => panic!("expected request, got {other:?}"),
    };
    let id_json = match &id {
        RequestId::Number(n) => json!(n),
        RequestId::Text(s) => json!(s),
    };
    peer.send_line(&format!(
        r#"{{"jsonrpc":"2.0","id":{id_json},"result":{{"sessionId":"s-1"}}}}"#
    ))
    .await;

    let result = call.await.unwrap().unwrap();
    assert_eq!(result, json!({"sessionId": "s-1"}));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn remote_error_payload_surfaces_as_remote_error() {
    let session = test_session(5);
    let mut peer = attach(&session).await;

    let session_task = Arc::clone(&session);
    let call = tokio::spawn(async move {
        session_task
            .send_request::<Value>("session/load", None)
            .await
    });

    let id = match peer.recv_message().await {
        JsonRpcMessage::Request(req) => req.id,
        other => panic!("expected request, got {other:?}"),
    };
    let RequestId::Number(id) = id else {
        panic!("expected numeric id");
    };
    peer.send_line(&format!(
        r#"{{"jsonrpc":"2.0","id":{id},"error":{{"code":-32601,"message":"method not found: session/load"}}}}"#
    ))
    .await;

    match call.await.unwrap().unwrap_err() {
        ConduitError::Remote(err) => assert_eq!(err.code, codes::METHOD_NOT_FOUND),
        other => panic!("expected remote error, got {other}"),
    }
}

#[tokio::test]
async fn unanswered_request_times_out_and_clears_its_entry() {
    let session = test_session(0);
    let _peer = attach(&session).await;

    let err = session
        .send_request::<Value>("session/prompt", None)
        .await
        .unwrap_err();
    match err {
        ConduitError::Timeout { method } => assert_eq!(method, "session/prompt"),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn late_or_unknown_response_is_dropped() {
    let session = test_session(5);
    let mut peer = attach(&session).await;

    // A response nobody asked for.
    peer.send_line(r#"{"jsonrpc":"2.0","id":999,"result":{}}"#)
        .await;

    // The session still correlates new calls afterwards.
    let session_task = Arc::clone(&session);
    let call = tokio::spawn(async move {
        session_task.send_request::<Value>("ping", None).await
    });
    let RequestId::Number(id) = (match peer.recv_message().await {
        JsonRpcMessage::Request(req) => req.id,
        other => panic!("expected request, got {other:?}"),
    }) else {
        panic!("expected numeric id");
    };
    peer.send_line(&format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{}}}}"#))
        .await;
    assert!(call.await.unwrap().is_ok());
}

#[tokio::test]
async fn inbound_request_without_handler_gets_method_not_found() {
    let session = test_session(5);
    let mut peer = attach(&session).await;

    peer.send_line(r#"{"jsonrpc":"2.0","id":3,"method":"no/such/method"}"#)
        .await;
    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => {
            assert_eq!(resp.id, RequestId::Number(3));
            assert_eq!(resp.error.map(|e| e.code), Some(codes::METHOD_NOT_FOUND));
        }
        other => panic!("expected error response, got {other:?}"),
    }
}

#[tokio::test]
async fn inbound_request_with_handler_gets_its_result() {
    let session = test_session(5);
    session.on_request(
        "math/add",
        Arc::new(|params| {
            Box::pin(async move {
                let params = params.unwrap_or(Value::Null);
                let a = params["a"].as_i64().unwrap_or(0);
                let b = params["b"].as_i64().unwrap_or(0);
                Ok(json!({"sum": a + b}))
            })
        }),
    );
    let mut peer = attach(&session).await;

    peer.send_line(r#"{"jsonrpc":"2.0","id":4,"method":"math/add","params":{"a":2,"b":3}}"#)
        .await;
    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => {
            assert_eq!(resp.id, RequestId::Number(4));
            assert_eq!(resp.result, Some(json!({"sum": 5})));
        }
        other => panic!("expected response, got {other:?}"),
    }
}

#[tokio::test]
async fn handler_error_becomes_an_error_response_and_session_survives() {
    let session = test_session(5);
    session.on_request(
        "always/fails",
        Arc::new(|_params| {
            Box::pin(async move { Err(RpcError::internal("handler exploded")) })
        }),
    );
    let mut peer = attach(&session).await;

    peer.send_line(r#"{"jsonrpc":"2.0","id":5,"method":"always/fails"}"#)
        .await;
    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => {
            assert_eq!(resp.error.map(|e| e.code), Some(codes::INTERNAL_ERROR));
        }
        other => panic!("expected error response, got {other:?}"),
    }

    // The failure stayed local to that request.
    peer.send_line(r#"{"jsonrpc":"2.0","id":6,"method":"no/such/method"}"#)
        .await;
    match peer.recv_message().await {
        JsonRpcMessage::Response(resp) => assert_eq!(resp.id, RequestId::Number(6)),
        other => panic!("expected response, got {other:?}"),
    }
}

#[tokio::test]
async fn notification_routes_to_its_handler() {
    let session = test_session(5);
    let (tx, rx) = tokio::sync::oneshot::channel::<Value>();
    let tx = std::sync::Mutex::new(Some(tx));
    session.on_notification(
        "session/cancel",
        Arc::new(move |params| {
            let tx = tx.lock().unwrap().take();
            Box::pin(async move {
                if let Some(tx) = tx {
                    let _ = tx.send(params.unwrap_or(Value::Null));
                }
            })
        }),
    );
    let mut peer = attach(&session).await;

    peer.send_line(r#"{"jsonrpc":"2.0","method":"session/cancel","params":{"sessionId":"s-1"}}"#)
        .await;
    assert_eq!(rx.await.unwrap(), json!({"sessionId": "s-1"}));
}

#[tokio::test]
async fn sending_before_attach_fails_with_detached() {
    let session = test_session(5);
    let err = session
        .send_request::<Value>("ping", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::Detached));
    assert!(matches!(
        session.send_notification("tick", None).await.unwrap_err(),
        ConduitError::Detached
    ));
}

#[tokio::test]
async fn failing_pending_requests_wakes_waiting_callers() {
    let session = test_session(30);
    let mut peer = attach(&session).await;

    let session_task = Arc::clone(&session);
    let call = tokio::spawn(async move {
        session_task.send_request::<Value>("ping", None).await
    });
    // The request must be in flight before the table is drained.
    let _ = peer.recv_message().await;

    session.fail_pending();
    match call.await.unwrap().unwrap_err() {
        ConduitError::Transport(msg) => assert!(msg.contains("terminated")),
        other => panic!("expected transport error, got {other}"),
    }
}
