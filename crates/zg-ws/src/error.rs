//! Transport error types.

use crate::message::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("RPC error: {0}")]
    Rpc(RpcError),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;

/// Address resolution errors. None of these involve network I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Chain spec error: {0}")]
    ChainSpec(String),

    #[error("Light client start failed: {0}")]
    LightClient(String),
}
