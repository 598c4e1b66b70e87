//! Mutation Facade
//!
//! The only entry point for user edits to the node map. Every call runs as
//! one transaction tagged `Origin::Local`, so observers (the persistence
//! bridge in particular) see exactly one event per call, and none when the
//! call changed nothing.

use crate::client::crdt::{Origin, SharedMap, Transaction};
use crate::shared::error::CollabError;
use crate::shared::node::{is_ancestor_or_self, Node};

/// Typed CRUD access to the node map
#[derive(Debug, Clone)]
pub struct MutationFacade {
    nodes: SharedMap<Node>,
}

impl MutationFacade {
    pub fn new(nodes: SharedMap<Node>) -> Self {
        Self { nodes }
    }

    /// The underlying map
    pub fn nodes(&self) -> &SharedMap<Node> {
        &self.nodes
    }

    /// Current value of a node
    pub fn read(&self, id: &str) -> Option<Node> {
        self.nodes.get(id)
    }

    /// Insert a new node under its own id and return that id
    pub fn create(&self, node: Node) -> String {
        let id = node.id.clone();
        self.set(&id, node);
        id
    }

    /// Write `node` under `id`.
    ///
    /// The stored node always carries `id` as its `id` field and keeps the
    /// server id of the node it replaces.
    pub fn set(&self, id: &str, node: Node) {
        self.nodes.transact(Origin::Local, |txn| write_preserving(txn, id, node));
    }

    /// Replace the node under `id` with `updater(current)`.
    ///
    /// Returning `None` deletes the node. Neither identifier can be rewritten
    /// through an update: `id` is forced back and the stored server id wins.
    pub fn update(&self, id: &str, updater: impl FnOnce(Option<Node>) -> Option<Node>) {
        self.nodes.transact(Origin::Local, |txn| match updater(txn.get(id)) {
            Some(next) => write_preserving(txn, id, next),
            None => {
                txn.delete(id);
            }
        });
    }

    /// Delete a node; returns its last value
    pub fn remove(&self, id: &str) -> Option<Node> {
        self.nodes.transact(Origin::Local, |txn| txn.delete(id))
    }

    /// Write several nodes in one transaction
    pub fn set_many(&self, entries: impl IntoIterator<Item = (String, Node)>) {
        self.nodes.transact(Origin::Local, |txn| {
            for (id, node) in entries {
                write_preserving(txn, &id, node);
            }
        });
    }

    /// Run several edits as one local transaction
    pub fn transact<R>(&self, f: impl FnOnce(&mut Transaction<'_, Node>) -> R) -> R {
        self.nodes.transact(Origin::Local, f)
    }

    /// Move a node under `new_parent` (`None` for top level).
    ///
    /// Fails when either node is missing or when the move would make the
    /// node its own ancestor.
    pub fn reparent(&self, id: &str, new_parent: Option<&str>) -> Result<(), CollabError> {
        self.nodes.transact(Origin::Local, |txn| {
            let mut node = txn
                .get(id)
                .ok_or_else(|| CollabError::NodeNotFound(id.to_string()))?;

            if let Some(parent_id) = new_parent {
                if !txn.contains_key(parent_id) {
                    return Err(CollabError::NodeNotFound(parent_id.to_string()));
                }
                let snapshot = txn.iter().collect();
                if is_ancestor_or_self(&snapshot, id, parent_id) {
                    return Err(CollabError::CycleDetected {
                        node_id: id.to_string(),
                        parent_id: parent_id.to_string(),
                    });
                }
            }

            node.parent_id = new_parent.map(str::to_string);
            txn.set(id, node);
            Ok(())
        })
    }

    /// Move a node to a new position
    pub fn move_to(&self, id: &str, x: f64, y: f64) -> Result<(), CollabError> {
        self.nodes.transact(Origin::Local, |txn| {
            let mut node = txn
                .get(id)
                .ok_or_else(|| CollabError::NodeNotFound(id.to_string()))?;
            node.x = Some(x);
            node.y = Some(y);
            txn.set(id, node);
            Ok(())
        })
    }
}

/// Store `node` under `id` with the identifiers the map already holds.
///
/// A server id is attached once by the persistence bridge; a facade write
/// never clears or replaces it. New keys keep whatever the caller passed.
fn write_preserving(txn: &mut Transaction<'_, Node>, id: &str, mut node: Node) {
    node.id = id.to_string();
    if let Some(existing) = txn.get(id) {
        node.server_id = existing.server_id;
    }
    txn.set(id, node);
}
