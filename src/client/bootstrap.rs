//! # Bootstrap Coordinator
//!
//! Seeds an empty node map from the REST backend exactly once per workspace
//! session.
//!
//! ## Flow
//!
//! 1. A map that already holds nodes was seeded by a peer; nothing is fetched.
//! 2. Otherwise the node list is fetched once.
//! 3. Nodes without coordinates are positioned by the `LayoutEngine`, and
//!    every coordinate is clamped to the canvas.
//! 4. All nodes are inserted in one `Origin::Bootstrap` transaction, skipping
//!    any whose id or server id is already present.
//! 5. Computed or clamped positions are written back one `PATCH` at a time.
//!    A failed write-back is logged and does not fail the bootstrap.
//!
//! The latch is set before the fetch and reset only when the workspace
//! changes or the attempt fails. There is no automatic retry.

use crate::client::api::MindmapApi;
use crate::client::crdt::{Origin, SharedMap};
use crate::client::layout::{clamp_coordinate, LayoutEngine, LayoutInput};
use crate::shared::dto::{nodes_from_dtos, NodeDto, UpdateNodeRequest};
use crate::shared::error::CollabError;
use crate::shared::node::Node;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of `ensure_bootstrapped`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// This call seeded the map from REST
    Seeded(BootstrapReport),
    /// The map already held nodes from peers
    SeededByPeer,
    /// The latch was already set for this workspace
    AlreadyBootstrapped,
}

/// Counts of one seeding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Nodes returned by the backend
    pub fetched: usize,
    /// Nodes inserted into the map
    pub inserted: usize,
    /// Nodes skipped because their id or server id was already present
    pub skipped: usize,
    /// Positions written back successfully
    pub positions_saved: usize,
    /// Positions whose write-back failed
    pub positions_failed: usize,
}

#[derive(Debug, Default)]
struct Latch {
    workspace_id: Option<String>,
    done: bool,
}

struct Prepared {
    node: Node,
    needs_write_back: bool,
}

/// Exactly-once seeding of the node map
pub struct BootstrapCoordinator {
    api: Arc<dyn MindmapApi>,
    layout: Arc<dyn LayoutEngine>,
    canvas_size: f64,
    latch: Mutex<Latch>,
}

impl BootstrapCoordinator {
    pub fn new(api: Arc<dyn MindmapApi>, layout: Arc<dyn LayoutEngine>, canvas_size: f64) -> Self {
        Self {
            api,
            layout,
            canvas_size,
            latch: Mutex::new(Latch::default()),
        }
    }

    /// Whether the latch is set for `workspace_id`
    pub fn is_bootstrapped(&self, workspace_id: &str) -> bool {
        let latch = self.latch.lock();
        latch.done && latch.workspace_id.as_deref() == Some(workspace_id)
    }

    /// Clear the latch and bind it to `workspace_id`
    pub fn reset_for(&self, workspace_id: &str) {
        let mut latch = self.latch.lock();
        latch.workspace_id = Some(workspace_id.to_string());
        latch.done = false;
    }

    /// Seed `map` from REST unless it was already seeded in this session
    pub async fn ensure_bootstrapped(
        &self,
        workspace_id: &str,
        map: &SharedMap<Node>,
    ) -> Result<BootstrapOutcome, CollabError> {
        {
            let mut latch = self.latch.lock();
            if latch.workspace_id.as_deref() != Some(workspace_id) {
                latch.workspace_id = Some(workspace_id.to_string());
                latch.done = false;
            }
            if latch.done {
                return Ok(BootstrapOutcome::AlreadyBootstrapped);
            }
            latch.done = true;
        }

        if !map.is_empty() {
            tracing::info!(
                "[Bootstrap] Workspace {} already has {} nodes from peers, skipping fetch",
                workspace_id,
                map.len()
            );
            return Ok(BootstrapOutcome::SeededByPeer);
        }

        let dtos = match self.api.list_nodes(workspace_id).await {
            Ok(dtos) => dtos,
            Err(e) => {
                tracing::error!("[Bootstrap] Failed to fetch nodes for {}: {}", workspace_id, e);
                self.release(workspace_id);
                return Err(e.into());
            }
        };

        let mut report = BootstrapReport {
            fetched: dtos.len(),
            ..BootstrapReport::default()
        };
        let prepared = self.prepare(&dtos);
        let inserted = Self::merge(map, &dtos, prepared, Origin::Bootstrap);
        report.inserted = inserted.len();
        report.skipped = report.fetched - report.inserted;
        tracing::info!(
            "[Bootstrap] Seeded workspace {} with {} nodes ({} skipped)",
            workspace_id,
            report.inserted,
            report.skipped
        );

        let (saved, failed) = self.write_back(workspace_id, &inserted).await;
        report.positions_saved = saved;
        report.positions_failed = failed;
        Ok(BootstrapOutcome::Seeded(report))
    }

    /// Re-read the node list and merge nodes the map does not have yet.
    ///
    /// Used after server-side bulk changes. Returns the number of nodes added.
    pub async fn refetch_and_merge(&self, workspace_id: &str, map: &SharedMap<Node>) -> Result<usize, CollabError> {
        let dtos = self.api.list_nodes(workspace_id).await?;
        if dtos.is_empty() {
            return Ok(0);
        }
        let prepared = self.prepare(&dtos);
        let inserted = Self::merge(map, &dtos, prepared, Origin::Bootstrap);
        tracing::info!(
            "[Bootstrap] Refetch merged {} of {} nodes into {}",
            inserted.len(),
            dtos.len(),
            workspace_id
        );
        self.write_back(workspace_id, &inserted).await;
        Ok(inserted.len())
    }

    /// Position nodes already in the map that lack coordinates.
    ///
    /// Positions are written in one transaction; durable nodes get their new
    /// position persisted. Returns the number of nodes positioned.
    pub async fn fill_missing_positions(&self, workspace_id: &str, map: &SharedMap<Node>) -> usize {
        let current = map.entries();
        if current.iter().all(|(_, node)| node.has_position()) {
            return 0;
        }
        let inputs: Vec<LayoutInput> = current
            .iter()
            .map(|(id, node)| LayoutInput {
                id: id.clone(),
                parent_id: node.parent_id.clone(),
                x: node.x,
                y: node.y,
            })
            .collect();
        let positions: HashMap<String, (f64, f64)> = self
            .layout
            .compute_layout(&inputs)
            .into_iter()
            .map(|p| (p.id.to_string(), (p.x, p.y)))
            .collect();

        let updated: Vec<(Node, bool)> = map.transact(Origin::Bootstrap, |txn| {
            let mut updated = Vec::new();
            for (id, _) in &current {
                let Some(existing) = txn.get(id) else {
                    continue;
                };
                if existing.has_position() {
                    continue;
                }
                let Some(&(x, y)) = positions.get(id) else {
                    continue;
                };
                let mut node = existing;
                node.x = Some(clamp_coordinate(x, self.canvas_size));
                node.y = Some(clamp_coordinate(y, self.canvas_size));
                txn.set(id.clone(), node.clone());
                updated.push((node, true));
            }
            updated
        });
        self.write_back(workspace_id, &updated).await;
        updated.len()
    }

    fn release(&self, workspace_id: &str) {
        let mut latch = self.latch.lock();
        if latch.workspace_id.as_deref() == Some(workspace_id) {
            latch.done = false;
        }
    }

    /// Map DTOs to nodes with final, clamped positions
    fn prepare(&self, dtos: &[NodeDto]) -> Vec<Prepared> {
        let nodes = nodes_from_dtos(dtos);
        let inputs: Vec<LayoutInput> = nodes
            .iter()
            .map(|node| LayoutInput {
                id: node.id.clone(),
                parent_id: node.parent_id.clone(),
                x: node.x,
                y: node.y,
            })
            .collect();
        let positions: HashMap<String, (f64, f64)> = self
            .layout
            .compute_layout(&inputs)
            .into_iter()
            .map(|p| (p.id.to_string(), (p.x, p.y)))
            .collect();

        nodes
            .into_iter()
            .map(|mut node| {
                let computed = !node.has_position();
                let (x, y) = match (node.x, node.y) {
                    (Some(x), Some(y)) => (x, y),
                    _ => positions.get(&node.id).copied().unwrap_or((0.0, 0.0)),
                };
                let clamped_x = clamp_coordinate(x, self.canvas_size);
                let clamped_y = clamp_coordinate(y, self.canvas_size);
                let was_clamped = clamped_x != x || clamped_y != y;
                node.x = Some(clamped_x);
                node.y = Some(clamped_y);
                Prepared {
                    node,
                    needs_write_back: computed || was_clamped,
                }
            })
            .collect()
    }

    /// Insert prepared nodes in one transaction, skipping known ids and server ids
    fn merge(map: &SharedMap<Node>, dtos: &[NodeDto], prepared: Vec<Prepared>, origin: Origin) -> Vec<(Node, bool)> {
        let parents: HashMap<String, Option<i64>> = dtos
            .iter()
            .map(|dto| (dto.client_id(), dto.parent_id))
            .collect();

        map.transact(origin, |txn| {
            let mut by_server_id: HashMap<i64, String> = txn
                .iter()
                .filter_map(|(id, node)| node.server_id.map(|sid| (sid, id.clone())))
                .collect();

            let mut inserted = Vec::new();
            for Prepared { mut node, needs_write_back } in prepared {
                let duplicate = node.server_id.is_some_and(|sid| by_server_id.contains_key(&sid));
                if duplicate || txn.contains_key(&node.id) {
                    continue;
                }
                // Parent may already live in the map under a locally created id
                if let Some(Some(parent_sid)) = parents.get(&node.id) {
                    if let Some(parent_id) = by_server_id.get(parent_sid) {
                        node.parent_id = Some(parent_id.clone());
                    }
                }
                if let Some(sid) = node.server_id {
                    by_server_id.insert(sid, node.id.clone());
                }
                txn.set(node.id.clone(), node.clone());
                inserted.push((node, needs_write_back));
            }
            inserted
        })
    }

    /// Persist computed or clamped positions, one call per node
    async fn write_back(&self, workspace_id: &str, nodes: &[(Node, bool)]) -> (usize, usize) {
        let mut saved = 0;
        let mut failed = 0;
        for (node, needs_write_back) in nodes {
            if !needs_write_back {
                continue;
            }
            let (Some(server_id), Some(x), Some(y)) = (node.server_id, node.x, node.y) else {
                continue;
            };
            match self
                .api
                .update_node(workspace_id, server_id, UpdateNodeRequest::position(x, y))
                .await
            {
                Ok(()) => saved += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        "[Bootstrap] Failed to save position of node {} ({}): {}",
                        node.id,
                        server_id,
                        e
                    );
                }
            }
        }
        (saved, failed)
    }
}
