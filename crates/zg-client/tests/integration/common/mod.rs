//! Shared test fixtures.

pub mod mock_node;
