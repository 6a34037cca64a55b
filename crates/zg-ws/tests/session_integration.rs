//! End-to-end tests for WebSocket sessions against an in-process node.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use zg_ws::{
    ConnectionConfig, PendingSession, Resolve, TransportResolver, TransportSignal, WsError,
};

/// Minimal JSON-RPC node: answers `system_chain`, acks watch subscriptions
/// with `"abc"` and immediately pushes a `ready` status on them.
/// `author_slowWatch` acks with `"slow"` after 300ms.
struct TestNode {
    url: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl TestNode {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else {
                        return;
                    };
                    let (mut write, mut read) = ws.split();

                    while let Some(Ok(msg)) = read.next().await {
                        let Message::Text(text) = msg else {
                            continue;
                        };
                        let request: Value = serde_json::from_str(&text).unwrap();
                        log.lock().await.push(request.clone());

                        let id = request["id"].clone();
                        match request["method"].as_str() {
                            Some("system_chain") => {
                                let reply = json!({"jsonrpc": "2.0", "id": id, "result": "Battery Station"});
                                write.send(Message::Text(reply.to_string())).await.unwrap();
                            }
                            Some("author_submitAndWatchExtrinsic") => {
                                let ack = json!({"jsonrpc": "2.0", "id": id, "result": "abc"});
                                let ready = json!({
                                    "jsonrpc": "2.0",
                                    "method": "author_extrinsicUpdate",
                                    "params": {"subscription": "abc", "result": "ready"}
                                });
                                write.send(Message::Text(ack.to_string())).await.unwrap();
                                write.send(Message::Text(ready.to_string())).await.unwrap();
                            }
                            Some("author_slowWatch") => {
                                tokio::time::sleep(Duration::from_millis(300)).await;
                                let ack = json!({"jsonrpc": "2.0", "id": id, "result": "slow"});
                                write.send(Message::Text(ack.to_string())).await.unwrap();
                            }
                            Some("author_unwatchExtrinsic") => {
                                let reply = json!({"jsonrpc": "2.0", "id": id, "result": true});
                                write.send(Message::Text(reply.to_string())).await.unwrap();
                            }
                            _ => {
                                let reply = json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "error": {"code": -32601, "message": "Method not found"}
                                });
                                write.send(Message::Text(reply.to_string())).await.unwrap();
                            }
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}"),
            received,
        }
    }

    async fn methods(&self) -> Vec<String> {
        self.received
            .lock()
            .await
            .iter()
            .filter_map(|r| r["method"].as_str().map(str::to_string))
            .collect()
    }
}

fn fast_resolver() -> TransportResolver {
    TransportResolver::new(ConnectionConfig {
        reconnect_base_delay_ms: 20,
        reconnect_max_delay_ms: 50,
        request_timeout_ms: 2_000,
        ..Default::default()
    })
}

async fn connected(node: &TestNode) -> PendingSession {
    let mut pending = fast_resolver().resolve(&node.url).unwrap();
    let signal = tokio::time::timeout(Duration::from_secs(5), pending.signals.recv())
        .await
        .expect("no signal from session");
    assert_eq!(signal, Some(TransportSignal::Connected));
    pending
}

#[tokio::test]
async fn test_request_round_trip() {
    let node = TestNode::start().await;
    let pending = connected(&node).await;

    let chain = pending.transport.request("system_chain", json!([])).await.unwrap();
    assert_eq!(chain, "Battery Station");

    let missing = pending.transport.request("nope_nope", json!([])).await;
    assert!(matches!(missing, Err(WsError::Rpc(e)) if e.code == -32601));

    pending.transport.close();
}

#[tokio::test]
async fn test_subscription_routes_first_notification() {
    let node = TestNode::start().await;
    let pending = connected(&node).await;

    let mut sub = pending
        .transport
        .subscribe(
            "author_submitAndWatchExtrinsic",
            json!(["0x00"]),
            "author_unwatchExtrinsic",
        )
        .await
        .unwrap();
    assert_eq!(sub.id, "abc");

    // Sent in the same burst as the ack; must not be lost.
    let first = tokio::time::timeout(Duration::from_secs(2), sub.notifications.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(json!("ready")));

    pending
        .transport
        .unsubscribe(&sub.unsubscribe_method, &sub.id)
        .unwrap();
    assert!(sub.notifications.recv().await.is_none());

    // The unsubscribe frame reaches the node.
    let mut seen = false;
    for _ in 0..50 {
        if node.methods().await.iter().any(|m| m == "author_unwatchExtrinsic") {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(seen, "unsubscribe frame never arrived");

    pending.transport.close();
}

#[tokio::test]
async fn test_close_fails_later_requests() {
    let node = TestNode::start().await;
    let pending = connected(&node).await;

    pending.transport.close();
    assert!(pending.transport.is_closed());

    let result = pending.transport.request("system_chain", json!([])).await;
    assert!(matches!(result, Err(WsError::Closed)));
}

#[tokio::test]
async fn test_unreachable_node_emits_errors() {
    // Reserve a port, then free it so nothing is listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut pending = fast_resolver().resolve(&format!("ws://{addr}")).unwrap();

    for _ in 0..3 {
        let signal = tokio::time::timeout(Duration::from_secs(5), pending.signals.recv())
            .await
            .expect("no signal from session");
        assert!(matches!(signal, Some(TransportSignal::Error(_))), "{signal:?}");
    }

    pending.transport.close();
}

#[tokio::test]
async fn test_late_subscription_ack_is_unwatched() {
    let node = TestNode::start().await;
    let resolver = TransportResolver::new(ConnectionConfig {
        reconnect_base_delay_ms: 20,
        reconnect_max_delay_ms: 50,
        request_timeout_ms: 100,
        ..Default::default()
    });
    let mut pending = resolver.resolve(&node.url).unwrap();
    let signal = tokio::time::timeout(Duration::from_secs(5), pending.signals.recv())
        .await
        .unwrap();
    assert_eq!(signal, Some(TransportSignal::Connected));

    let result = pending
        .transport
        .subscribe("author_slowWatch", json!([]), "author_unwatchExtrinsic")
        .await;
    assert!(matches!(result, Err(WsError::Timeout(_))));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let unwatches: Vec<Value> = node
        .received
        .lock()
        .await
        .iter()
        .filter(|r| r["method"] == "author_unwatchExtrinsic")
        .cloned()
        .collect();
    assert_eq!(unwatches.len(), 1);
    assert_eq!(unwatches[0]["params"], json!(["slow"]));

    pending.transport.close();
}
