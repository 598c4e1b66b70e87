//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - A recording in-memory REST backend
//! - Node fixtures and polling helpers
//! - Assertion macros

#[macro_use]
pub mod assertions;
pub mod backend;

// Re-export commonly used utilities
pub use backend::*;

use mindmap_collab::shared::Node;
use std::time::Duration;

/// Node with a fixed client id and position
pub fn node(id: &str, keyword: &str) -> Node {
    Node::new(keyword).with_id(id).at(100.0, 100.0)
}

/// Node that already carries a server id
pub fn durable(id: &str, server_id: i64) -> Node {
    let mut node = node(id, id);
    node.server_id = Some(server_id);
    node
}

/// Poll `condition` until it holds or about a second passed
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
