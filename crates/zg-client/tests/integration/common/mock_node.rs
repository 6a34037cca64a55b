//! Mock JSON-RPC node for integration tests.
//!
//! Serves over WebSocket:
//! - `state_getMetadata ["pallets" | "types"]` from canned sections
//! - `system_accountNextIndex` with an incrementing nonce
//! - `author_submitAndWatchExtrinsic`: acks with `tx-N`, then pushes the
//!   scripted status notifications for that submission
//! - `author_unwatchExtrinsic`
//!
//! Every received request is recorded. A plain HTTP responder stands in
//! for the auxiliary GraphQL service.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Canned metadata: `System` (0), `Balances` (6, no errors) and
/// `PredictionMarkets` (57).
pub fn pallets_section() -> Value {
    json!({"version": 14, "pallets": [
        {"name": "System", "index": 0, "error": 10},
        {"name": "Balances", "index": 6, "error": null},
        {"name": "PredictionMarkets", "index": 57, "error": 20}
    ]})
}

pub fn types_section() -> Value {
    json!({"version": 14, "types": [
        {"id": 10, "path": ["frame_system", "pallet", "Error"], "variants": [
            {"name": "InvalidSpecName", "docs": ["The name of specification does not match between", "the current runtime and the new runtime."]}
        ]},
        {"id": 11, "path": ["sp_runtime", "DispatchError"], "variants": [
            {"name": "Other", "docs": []}
        ]},
        {"id": 20, "path": ["zrml_prediction_markets", "pallet", "Error"], "variants": [
            {"name": "MarketIsNotActive", "docs": ["Market is not active."]},
            {"name": "NotEnoughBalance", "docs": ["Sender does not have enough balance to buy shares."]}
        ]}
    ]})
}

/// A mock node.
pub struct MockNode {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    received: Arc<Mutex<Vec<Value>>>,
    statuses: Arc<Mutex<VecDeque<Vec<Value>>>>,
}

impl MockNode {
    /// Start a node on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let statuses: Arc<Mutex<VecDeque<Vec<Value>>>> = Arc::new(Mutex::new(VecDeque::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let received_clone = received.clone();
        let statuses_clone = statuses.clone();
        let nonce = Arc::new(AtomicU64::new(0));
        let next_sub = Arc::new(AtomicU64::new(1));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            received_clone.clone(),
                            statuses_clone.clone(),
                            nonce.clone(),
                            next_sub.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            received,
            statuses,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Script the status results pushed after the next submission's ack.
    pub async fn script_statuses(&self, results: Vec<Value>) {
        self.statuses.lock().await.push_back(results);
    }

    /// All received requests.
    pub async fn requests(&self) -> Vec<Value> {
        self.received.lock().await.clone()
    }

    /// Received requests for one method.
    pub async fn requests_for(&self, method: &str) -> Vec<Value> {
        self.received
            .lock()
            .await
            .iter()
            .filter(|r| r["method"] == method)
            .cloned()
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    received: Arc<Mutex<Vec<Value>>>,
    statuses: Arc<Mutex<VecDeque<Vec<Value>>>>,
    nonce: Arc<AtomicU64>,
    next_sub: Arc<AtomicU64>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    while let Some(Ok(msg)) = read.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        received.lock().await.push(request.clone());

        let id = request["id"].clone();
        let reply = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});

        let mut outgoing = Vec::new();
        match request["method"].as_str() {
            Some("state_getMetadata") => match request["params"][0].as_str() {
                Some("pallets") => outgoing.push(reply(pallets_section())),
                Some("types") => outgoing.push(reply(types_section())),
                _ => outgoing.push(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32602, "message": "unknown metadata section"}
                })),
            },
            Some("system_accountNextIndex") => {
                outgoing.push(reply(json!(nonce.fetch_add(1, Ordering::SeqCst))));
            }
            Some("author_submitAndWatchExtrinsic") => {
                let sub = format!("tx-{}", next_sub.fetch_add(1, Ordering::SeqCst));
                outgoing.push(reply(json!(sub)));
                let scripted = statuses.lock().await.pop_front().unwrap_or_default();
                for result in scripted {
                    outgoing.push(json!({
                        "jsonrpc": "2.0",
                        "method": "author_extrinsicUpdate",
                        "params": {"subscription": sub, "result": result}
                    }));
                }
            }
            Some("author_unwatchExtrinsic") => outgoing.push(reply(json!(true))),
            _ => outgoing.push(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            })),
        }

        for frame in outgoing {
            if write.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
    }
}

/// Serve a GraphQL-looking `{"data": ...}` body on every request.
pub async fn start_aux_service() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let body = r#"{"data":{"__typename":"Query"}}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}/graphql")
}

/// An address nothing listens on.
pub async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/graphql")
}
