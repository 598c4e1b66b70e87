//! Mind-map Node Model
//!
//! The unit of shared state. A `Node` lives in the replicated node map under
//! its client id and is mirrored to every peer in the workspace room.
//!
//! # Identity
//!
//! - `id` is assigned locally when the node is created and never changes.
//! - `server_id` is attached once the backend has persisted the node. A node
//!   without one has never been durable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default node color used when the user has not picked one
pub const DEFAULT_NODE_COLOR: &str = "#263A6B";

/// Kind of content a node carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Plain keyword node
    #[default]
    Text,
    /// Image attachment node
    Image,
    /// Video link node
    Video,
}

/// Progress of the backend analysis for a node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisStatus {
    /// Never analyzed
    #[default]
    None,
    /// Analysis requested and running
    Pending,
    /// Analysis finished
    Done,
}

/// A mind-map node as stored in the replicated map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Client-stable identifier
    pub id: String,
    /// Backend identifier, present once persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    /// Client id of the parent, `None` for top-level nodes
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Node label
    pub keyword: String,
    /// Free-form note attached to the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Fill color
    pub color: String,
    /// Content kind
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Horizontal position, absent until a layout pass assigns one
    #[serde(default)]
    pub x: Option<f64>,
    /// Vertical position, absent until a layout pass assigns one
    #[serde(default)]
    pub y: Option<f64>,
    /// Backend analysis progress
    #[serde(default)]
    pub analysis_status: AnalysisStatus,
}

impl Node {
    /// Create a new, not yet persisted text node with a temporary id
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            id: Self::temporary_id(),
            server_id: None,
            parent_id: None,
            keyword: keyword.into(),
            memo: None,
            color: DEFAULT_NODE_COLOR.to_string(),
            node_type: NodeType::Text,
            x: None,
            y: None,
            analysis_status: AnalysisStatus::None,
        }
    }

    /// Generate a temporary client id for a locally created node
    pub fn temporary_id() -> String {
        format!("tmp-{}", Uuid::new_v4())
    }

    /// Use a specific client id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach to a parent
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Place the node at a position
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Set the fill color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Set the content kind
    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    /// Whether the backend has persisted this node
    pub fn is_durable(&self) -> bool {
        self.server_id.is_some()
    }

    /// Whether this node has both coordinates
    pub fn has_position(&self) -> bool {
        self.x.is_some() && self.y.is_some()
    }

    /// Whether this node is top-level
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Direct children of `parent_id`, in id order
pub fn children_of<'a>(nodes: &'a HashMap<String, Node>, parent_id: &str) -> Vec<&'a Node> {
    let mut children: Vec<&Node> = nodes
        .values()
        .filter(|node| node.parent_id.as_deref() == Some(parent_id))
        .collect();
    children.sort_by(|a, b| a.id.cmp(&b.id));
    children
}

/// Whether `ancestor_id` is `node_id` itself or appears on its parent chain.
///
/// The walk gives up after visiting every node once, so a map that already
/// holds a cycle cannot loop forever.
pub fn is_ancestor_or_self(nodes: &HashMap<String, Node>, ancestor_id: &str, node_id: &str) -> bool {
    let mut current = Some(node_id);
    let mut steps = 0usize;
    while let Some(id) = current {
        if id == ancestor_id {
            return true;
        }
        steps += 1;
        if steps > nodes.len() {
            return false;
        }
        current = nodes.get(id).and_then(|node| node.parent_id.as_deref());
    }
    false
}

/// Depth of a node in the tree, top-level nodes are depth 0
pub fn depth_of(nodes: &HashMap<String, Node>, node_id: &str) -> usize {
    let mut depth = 0usize;
    let mut current = nodes.get(node_id).and_then(|n| n.parent_id.as_deref());
    while let Some(id) = current {
        depth += 1;
        if depth > nodes.len() {
            break;
        }
        current = nodes.get(id).and_then(|n| n.parent_id.as_deref());
    }
    depth
}
