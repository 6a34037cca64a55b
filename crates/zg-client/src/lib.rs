//! zg chain client.
//!
//! Bootstraps a ready session to a node and exposes the client handle used
//! to decode node errors and submit operations:
//! - [`Bootstrapper`]: resolve, race connect against retries and timeout,
//!   probe the auxiliary service, populate the error table
//! - [`ClientHandle`]: one live session, released exactly once
//! - [`ClientConfig`]: TOML configuration with `ZG_*` overrides

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;

pub use bootstrap::Bootstrapper;
pub use client::ClientHandle;
pub use config::{ClientConfig, SignerConfig};
pub use error::{BootstrapError, ClientError, ClientResult};
