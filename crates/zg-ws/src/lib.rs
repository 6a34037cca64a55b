//! Node transports for zg clients.
//!
//! Provides:
//! - Address resolution (`ws`, `wss`, `light`) with no network I/O on failure
//! - JSON-RPC 2.0 sessions over WebSocket with reconnect and backoff
//! - Subscription routing and fire-and-forget unsubscribe
//! - Heartbeat monitoring
//! - An in-memory mock transport for tests

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod light;
pub mod message;
pub mod mock;
pub mod resolver;
pub mod rpc_handle;
pub mod subscription;
pub mod transport;

pub use connection::{ConnectionConfig, ConnectionState, WsSession};
pub use error::{ResolveError, WsError, WsResult};
pub use light::{ChainSpec, LightClientFactory};
pub use message::{IncomingMessage, RpcError, RpcNotification, RpcRequest, RpcResponse};
pub use mock::MockTransport;
pub use resolver::{NodeAddress, Resolve, Scheme, TransportResolver};
pub use rpc_handle::{RpcHandle, WsOutbound};
pub use subscription::{OrphanedSubscription, RequestRegistry};
pub use transport::{
    BoxFuture, DynTransport, PendingSession, Subscription, Transport, TransportSignal,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss` session is started.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
