//! JSON-RPC 2.0 message types.
//!
//! Outgoing requests carry a numeric `id`; incoming frames are either a
//! response (has `id`) or a subscription notification (has `method` and
//! `params.subscription`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Requests (Outgoing)
// ============================================================================

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    /// Create a new request. Non-array, non-object params are wrapped in an array.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Array(_) | Value::Object(_) => params,
            Value::Null => Value::Array(Vec::new()),
            other => Value::Array(vec![other]),
        };
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Responses and notifications (Incoming)
// ============================================================================

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Extract the result value, returning the RPC error if present.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Subscription notification pushed by the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcNotification {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    pub params: NotificationParams,
}

/// Params of a subscription notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationParams {
    /// Subscription id (string or number depending on the node).
    pub subscription: Value,
    pub result: Value,
}

impl RpcNotification {
    /// Normalized subscription key.
    pub fn subscription_key(&self) -> Option<String> {
        subscription_key(&self.params.subscription)
    }
}

/// Incoming frame.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IncomingMessage {
    Response(RpcResponse),
    Notification(RpcNotification),
}

/// Normalize a subscription id to a string key.
///
/// Nodes return either string or integer ids; both forms route to the same key.
pub fn subscription_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
