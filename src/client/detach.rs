//! # Detachment Resolver
//!
//! "Delete but keep children": the deleted node's children become top-level
//! and each one waits for the user to decide whether to reattach it to the
//! deleted node's parent or leave it where it is.
//!
//! ## Lifecycle
//!
//! - `PendingDecision` after `delete_keep_children`
//! - `Reattached` after `reattach` (to the target, or top level if the
//!   target is gone)
//! - `Dismissed` after `dismiss`
//! - `Expired` when the anchor node disappears before a decision
//!
//! Pending records are local to this client and never replicated.

use crate::client::crdt::{ChangeAction, Subscription};
use crate::client::crud::MutationFacade;
use crate::shared::error::CollabError;
use crate::shared::node::Node;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a detached child stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachmentState {
    PendingDecision,
    Reattached,
    Dismissed,
    Expired,
}

/// A child orphaned by a keep-children delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSelection {
    /// Unique id of this detachment
    pub selection_id: String,
    /// The orphaned child
    pub anchor_node_id: String,
    /// The node that was deleted
    pub original_parent_id: String,
    /// Parent offered for reattachment, the deleted node's own parent
    pub target_parent_id: Option<String>,
}

#[derive(Default)]
struct Records {
    pending: HashMap<String, DetachedSelection>,
    outcomes: HashMap<String, DetachmentState>,
}

/// Tracks pending reattachment decisions
pub struct DetachmentResolver {
    crud: MutationFacade,
    records: Arc<Mutex<Records>>,
    _subscription: Subscription,
}

impl DetachmentResolver {
    /// Create a resolver; anchors deleted later expire their records
    pub fn new(crud: MutationFacade) -> Self {
        let records = Arc::new(Mutex::new(Records::default()));
        let observed = records.clone();
        let subscription = crud.nodes().observe(move |event| {
            let mut records = observed.lock();
            for change in &event.changes {
                if change.action == ChangeAction::Delete && records.pending.remove(&change.key).is_some() {
                    tracing::debug!("[Detach] Anchor {} deleted, record expired", change.key);
                    records.outcomes.insert(change.key.clone(), DetachmentState::Expired);
                }
            }
        });
        Self {
            crud,
            records,
            _subscription: subscription,
        }
    }

    /// Delete `node_id` and orphan its direct children.
    ///
    /// Runs as one local transaction. Every child is registered as pending
    /// with the deleted node's parent as target.
    pub fn delete_keep_children(&self, node_id: &str) -> Result<Vec<DetachedSelection>, CollabError> {
        let (target, children) = self.crud.transact(|txn| {
            let node = txn
                .get(node_id)
                .ok_or_else(|| CollabError::NodeNotFound(node_id.to_string()))?;
            let mut children: Vec<Node> = txn
                .iter()
                .map(|(_, child)| child)
                .filter(|child| child.parent_id.as_deref() == Some(node_id))
                .collect();
            children.sort_by(|a, b| a.id.cmp(&b.id));

            for child in &children {
                let mut orphan = child.clone();
                orphan.parent_id = None;
                txn.set(child.id.clone(), orphan);
            }
            txn.delete(node_id);
            Ok::<_, CollabError>((node.parent_id, children))
        })?;

        let timestamp = chrono::Utc::now().timestamp_millis();
        let selections: Vec<DetachedSelection> = children
            .iter()
            .enumerate()
            .map(|(index, child)| DetachedSelection {
                selection_id: format!("{}-{}-{}", node_id, child.id, timestamp + index as i64),
                anchor_node_id: child.id.clone(),
                original_parent_id: node_id.to_string(),
                target_parent_id: target.clone(),
            })
            .collect();

        let mut records = self.records.lock();
        for selection in &selections {
            records
                .pending
                .insert(selection.anchor_node_id.clone(), selection.clone());
            records
                .outcomes
                .insert(selection.anchor_node_id.clone(), DetachmentState::PendingDecision);
        }
        tracing::info!(
            "[Detach] Deleted {} keeping {} children",
            node_id,
            selections.len()
        );
        Ok(selections)
    }

    /// Reattach an orphaned node to its target.
    ///
    /// A target that no longer exists reattaches to top level. Returns `None`
    /// when nothing is pending for `anchor`.
    pub fn reattach(&self, anchor: &str) -> Result<Option<DetachmentState>, CollabError> {
        let Some(selection) = self.records.lock().pending.remove(anchor) else {
            return Ok(None);
        };
        if self.crud.read(anchor).is_none() {
            self.set_outcome(anchor, DetachmentState::Expired);
            return Ok(Some(DetachmentState::Expired));
        }
        let target = selection
            .target_parent_id
            .clone()
            .filter(|parent| self.crud.read(parent).is_some());
        if let Err(e) = self.crud.reparent(anchor, target.as_deref()) {
            tracing::warn!("[Detach] Reattach of {} failed: {}", anchor, e);
            self.records.lock().pending.insert(anchor.to_string(), selection);
            return Err(e);
        }
        self.set_outcome(anchor, DetachmentState::Reattached);
        tracing::debug!("[Detach] Reattached {} to {:?}", anchor, target);
        Ok(Some(DetachmentState::Reattached))
    }

    /// Leave an orphaned node at top level and forget the record
    pub fn dismiss(&self, anchor: &str) -> Option<DetachmentState> {
        self.records.lock().pending.remove(anchor)?;
        self.set_outcome(anchor, DetachmentState::Dismissed);
        Some(DetachmentState::Dismissed)
    }

    /// Expire records whose anchor is no longer in the map.
    ///
    /// Returns the expired anchors.
    pub fn reconcile(&self) -> Vec<String> {
        let mut records = self.records.lock();
        let mut expired: Vec<String> = records
            .pending
            .keys()
            .filter(|anchor| !self.crud.nodes().contains_key(anchor))
            .cloned()
            .collect();
        expired.sort();
        for anchor in &expired {
            records.pending.remove(anchor);
            records.outcomes.insert(anchor.clone(), DetachmentState::Expired);
        }
        expired
    }

    /// Pending record of `anchor`
    pub fn pending(&self, anchor: &str) -> Option<DetachedSelection> {
        self.records.lock().pending.get(anchor).cloned()
    }

    /// All pending records, sorted by anchor
    pub fn pending_all(&self) -> Vec<DetachedSelection> {
        let mut all: Vec<DetachedSelection> = self.records.lock().pending.values().cloned().collect();
        all.sort_by(|a, b| a.anchor_node_id.cmp(&b.anchor_node_id));
        all
    }

    /// Last known state of `anchor`
    pub fn state(&self, anchor: &str) -> Option<DetachmentState> {
        self.records.lock().outcomes.get(anchor).copied()
    }

    fn set_outcome(&self, anchor: &str, state: DetachmentState) {
        self.records.lock().outcomes.insert(anchor.to_string(), state);
    }
}
