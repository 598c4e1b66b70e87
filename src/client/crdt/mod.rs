//! # Replicated Node Map
//!
//! Keyed map that every peer of a workspace holds a replica of, backed by a
//! `yrs` document. Whole values are replaced on write and concurrent writes
//! to one key resolve last-writer-wins, the same way on every replica.
//!
//! ## Key Components
//!
//! - `shared_map.rs`: cloneable handle with origin-tagged transactions,
//!   observers and outbound v1 updates
//!
//! ## Usage
//!
//! ```rust
//! use mindmap_collab::client::crdt::{ChangeAction, Origin, SharedMap};
//! use std::sync::{Arc, Mutex};
//!
//! let map: SharedMap<String> = SharedMap::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _sub = map.observe(move |event| {
//!     sink.lock().unwrap().push((event.origin, event.changes.len()));
//! });
//!
//! map.transact(Origin::Local, |txn| {
//!     txn.set("a", "one".to_string());
//!     txn.set("b", "two".to_string());
//! });
//!
//! assert_eq!(seen.lock().unwrap().as_slice(), &[(Origin::Local, 2)]);
//! assert_eq!(map.get("a").as_deref(), Some("one"));
//! ```

pub mod shared_map;

pub use shared_map::{SharedMap, Transaction};

/// Transaction origin of updates merged from the relay
pub(crate) const PEER_ORIGIN: &str = "peer";

/// Who authored a transaction.
///
/// Observers use the origin to tell local user edits from state that arrived
/// from peers or from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Edit made by the local user through the mutation facade
    Local,
    /// State merged from a peer or written back from the backend
    Remote,
    /// Initial seeding from the REST backend
    Bootstrap,
}

impl Origin {
    /// Whether the transaction came from the local user
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }

    /// Tag stored on the `yrs` transaction
    pub fn tag(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Remote => "remote",
            Origin::Bootstrap => "bootstrap",
        }
    }

    /// Origin of a committed `yrs` transaction.
    ///
    /// Untagged and foreign transactions count as remote, so they are never
    /// projected to the backend.
    pub fn of(origin: Option<&yrs::Origin>) -> Self {
        match origin {
            Some(tag) if *tag == yrs::Origin::from(Origin::Local.tag()) => Origin::Local,
            Some(tag) if *tag == yrs::Origin::from(Origin::Bootstrap.tag()) => Origin::Bootstrap,
            _ => Origin::Remote,
        }
    }
}

/// Kind of change a key went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Key had no live value before
    Add,
    /// Key had a live value and still has one
    Update,
    /// Key lost its live value
    Delete,
}

/// Net change of one key within a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange<V> {
    pub key: String,
    pub action: ChangeAction,
    /// Live value before the transaction
    pub old: Option<V>,
    /// Live value after the transaction
    pub new: Option<V>,
}

impl<V: PartialEq> KeyChange<V> {
    /// Build the net change between two live states, `None` if nothing changed
    pub fn between(key: impl Into<String>, old: Option<V>, new: Option<V>) -> Option<Self> {
        let action = match (&old, &new) {
            (None, None) => return None,
            (Some(before), Some(after)) if before == after => return None,
            (None, Some(_)) => ChangeAction::Add,
            (Some(_), Some(_)) => ChangeAction::Update,
            (Some(_), None) => ChangeAction::Delete,
        };
        Some(Self {
            key: key.into(),
            action,
            old,
            new,
        })
    }
}

/// One committed transaction as seen by observers
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent<V> {
    pub origin: Origin,
    pub changes: Vec<KeyChange<V>>,
}

/// Observer registration; dropping it unsubscribes
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribe now instead of at drop
    pub fn cancel(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
