//! Integration tests for zg-client.
//!
//! These tests run the real WebSocket session against an in-process node:
//! - Bootstrap and error table population
//! - Submission and lifecycle tracking
//! - Node-reported error decoding

pub mod common;
