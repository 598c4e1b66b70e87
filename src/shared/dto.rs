//! REST Data Transfer Objects
//!
//! Request and response shapes of the mind-map REST API, plus the mapping
//! between backend DTOs and the `Node` shape held in the replicated map.
//!
//! The backend addresses nodes and parents by numeric server id, while the
//! replicated map addresses them by client id. Mapping in both directions goes
//! through the server ids known at the time of the call.

use crate::shared::node::{AnalysisStatus, Node, NodeType, DEFAULT_NODE_COLOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Node as returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    /// Document id assigned by the backend store, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Numeric backend id
    pub node_id: i64,
    /// Server id of the parent
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Content kind
    #[serde(rename = "type", default)]
    pub node_type: Option<NodeType>,
    /// Node label
    pub keyword: String,
    /// Free-form note
    #[serde(default)]
    pub memo: Option<String>,
    /// Analysis progress
    #[serde(default)]
    pub analysis_status: Option<AnalysisStatus>,
    /// Horizontal position
    #[serde(default)]
    pub x: Option<f64>,
    /// Vertical position
    #[serde(default)]
    pub y: Option<f64>,
    /// Fill color
    #[serde(default)]
    pub color: Option<String>,
}

impl NodeDto {
    /// Client id the node is stored under in the replicated map.
    ///
    /// Derived from backend identity only, so two peers seeding the same
    /// workspace concurrently write the same keys.
    pub fn client_id(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.node_id.to_string(),
        }
    }
}

/// Body of `POST /mindmap/{workspaceId}/node`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeRequest {
    /// Server id of the parent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// Content kind
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Node label
    pub keyword: String,
    /// Free-form note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Horizontal position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Vertical position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Fill color
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CreateNodeRequest {
    /// Build the create body for a node whose parent has `parent_server_id`
    pub fn from_node(node: &Node, parent_server_id: Option<i64>) -> Self {
        Self {
            parent_id: parent_server_id,
            node_type: node.node_type,
            keyword: node.keyword.clone(),
            memo: node.memo.clone(),
            x: node.x,
            y: node.y,
            color: Some(node.color.clone()),
        }
    }
}

/// Body of `PATCH /mindmap/{workspaceId}/node/{serverId}`.
///
/// Every field is optional; `parent_id` is tri-state so a node can be moved
/// to top level (`Some(None)` serializes as `null`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodeRequest {
    /// Node label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Horizontal position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Vertical position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Fill color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Server id of the new parent, `Some(None)` for top level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<i64>>,
    /// Content kind
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    /// Analysis progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_status: Option<AnalysisStatus>,
}

impl UpdateNodeRequest {
    /// Full-state update carrying every field of `node`
    pub fn from_node(node: &Node, parent_server_id: Option<i64>) -> Self {
        Self {
            keyword: Some(node.keyword.clone()),
            memo: node.memo.clone(),
            x: node.x,
            y: node.y,
            color: Some(node.color.clone()),
            parent_id: Some(parent_server_id),
            node_type: Some(node.node_type),
            analysis_status: Some(node.analysis_status),
        }
    }

    /// Position-only update
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }
}

/// Convert a REST node list into map nodes.
///
/// Parent references are translated from server ids to client ids. A parent
/// id that is not part of the list leaves the node top-level.
pub fn nodes_from_dtos(dtos: &[NodeDto]) -> Vec<Node> {
    let client_ids: HashMap<i64, String> = dtos
        .iter()
        .map(|dto| (dto.node_id, dto.client_id()))
        .collect();

    dtos.iter()
        .map(|dto| Node {
            id: dto.client_id(),
            server_id: Some(dto.node_id),
            parent_id: dto
                .parent_id
                .and_then(|parent| client_ids.get(&parent).cloned()),
            keyword: dto.keyword.clone(),
            memo: dto.memo.clone(),
            color: dto
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_NODE_COLOR.to_string()),
            node_type: dto.node_type.unwrap_or_default(),
            x: dto.x,
            y: dto.y,
            analysis_status: dto.analysis_status.unwrap_or_default(),
        })
        .collect()
}
