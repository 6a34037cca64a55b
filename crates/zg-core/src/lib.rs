//! Core domain types for the zg chain client.
//!
//! This crate provides the types shared by every layer of the client:
//! - `StatusTag`, `StatusUpdate`: node-pushed transaction lifecycle notifications
//! - `ChainEvent`: an event emitted in a block, with its origin subsystem
//! - `ModuleError`: the raw `{subsystem, error}` index pair of a failed dispatch
//! - `BlockRef`: opaque block hash reference

pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{BlockRef, ChainEvent, ModuleError, StatusTag, StatusUpdate};
