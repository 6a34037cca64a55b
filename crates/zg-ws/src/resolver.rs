//! Transport resolution.
//!
//! Turns a node address (`scheme://host[:port][/path]`) into a pending
//! session. Address parsing and scheme checks happen before any network
//! I/O, so an unsupported scheme never opens a socket.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::connection::{ConnectionConfig, WsSession};
use crate::error::ResolveError;
use crate::light::{ChainSpec, LightClientFactory};
use crate::transport::PendingSession;

/// Recognized address schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Persistent duplex socket (`ws` / `wss`).
    Socket { secure: bool },
    /// Embedded light client (`light`), requires a chain spec.
    LightClient,
}

/// Parsed node address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    raw: String,
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
}

impl NodeAddress {
    /// Parse an address string.
    ///
    /// # Errors
    /// - `UnsupportedProtocol` for a missing or unrecognized scheme
    /// - `InvalidAddress` for an empty host or a bad port
    pub fn parse(address: &str) -> Result<Self, ResolveError> {
        let address = address.trim();
        let Some((scheme, rest)) = address.split_once("://") else {
            return Err(ResolveError::UnsupportedProtocol(format!(
                "no scheme in address: {address}"
            )));
        };

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "ws" => Scheme::Socket { secure: false },
            "wss" => Scheme::Socket { secure: true },
            "light" => Scheme::LightClient,
            other => return Err(ResolveError::UnsupportedProtocol(other.to_string())),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (host, port) = split_host_port(authority)?;
        if host.is_empty() {
            return Err(ResolveError::InvalidAddress(format!(
                "empty host in address: {address}"
            )));
        }

        Ok(Self {
            raw: address.to_string(),
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for NodeAddress {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_host_port(authority: &str) -> Result<(&str, Option<u16>), ResolveError> {
    // Bracketed IPv6: [::1]:9944
    if let Some(stripped) = authority.strip_prefix('[') {
        let Some((host, tail)) = stripped.split_once(']') else {
            return Err(ResolveError::InvalidAddress(format!(
                "unterminated IPv6 literal: {authority}"
            )));
        };
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(parse_port(port)?),
            None if tail.is_empty() => None,
            None => {
                return Err(ResolveError::InvalidAddress(format!(
                    "unexpected text after IPv6 literal: {authority}"
                )))
            }
        };
        return Ok((host, port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(port: &str) -> Result<u16, ResolveError> {
    port.parse::<u16>()
        .map_err(|_| ResolveError::InvalidAddress(format!("invalid port: {port}")))
}

/// Resolves an address into a pending session.
pub trait Resolve: Send + Sync {
    fn resolve(&self, address: &str) -> Result<PendingSession, ResolveError>;
}

/// Default resolver: WebSocket sessions plus an optional light-client factory.
#[derive(Clone)]
pub struct TransportResolver {
    /// Template for socket sessions; `url` is replaced by the address.
    connection: ConnectionConfig,
    chain_spec_path: Option<PathBuf>,
    light_client: Option<Arc<dyn LightClientFactory>>,
}

impl TransportResolver {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            chain_spec_path: None,
            light_client: None,
        }
    }

    /// Chain spec document used for `light://` addresses.
    pub fn with_chain_spec(mut self, path: impl Into<PathBuf>) -> Self {
        self.chain_spec_path = Some(path.into());
        self
    }

    /// Register the embedded light-client implementation.
    pub fn with_light_client(mut self, factory: Arc<dyn LightClientFactory>) -> Self {
        self.light_client = Some(factory);
        self
    }

    fn resolve_light(&self, address: &NodeAddress) -> Result<PendingSession, ResolveError> {
        let Some(factory) = self.light_client.as_ref() else {
            return Err(ResolveError::LightClient(
                "no light client registered".to_string(),
            ));
        };
        let Some(path) = self.chain_spec_path.as_ref() else {
            return Err(ResolveError::ChainSpec(
                "light client address requires chain_spec_path".to_string(),
            ));
        };

        let spec = ChainSpec::from_file(path)?;
        if !spec.matches(address.host()) {
            return Err(ResolveError::ChainSpec(format!(
                "chain spec {} does not describe chain {}",
                spec.id,
                address.host()
            )));
        }

        info!(chain = %spec.id, boot_nodes = spec.boot_nodes.len(), "Starting light client");
        factory
            .start(spec)
            .map_err(|e| ResolveError::LightClient(e.to_string()))
    }
}

impl Default for TransportResolver {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl Resolve for TransportResolver {
    fn resolve(&self, address: &str) -> Result<PendingSession, ResolveError> {
        let address = NodeAddress::parse(address)?;
        debug!(address = %address, scheme = ?address.scheme(), "Resolved node address");

        match address.scheme() {
            Scheme::Socket { .. } => {
                let config = ConnectionConfig {
                    url: address.as_str().to_string(),
                    ..self.connection.clone()
                };
                Ok(WsSession::start(config))
            }
            Scheme::LightClient => self.resolve_light(&address),
        }
    }
}
