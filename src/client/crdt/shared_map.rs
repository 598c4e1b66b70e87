//! # Shared Map Handle
//!
//! Cloneable, thread-safe handle to one replica of the node map, a `Y.Map`
//! inside a `yrs::Doc`.
//!
//! ## Features
//!
//! - **Transactions**: every write goes through `transact`, which opens a
//!   `yrs` transaction tagged with the `Origin`. The `yrs` map observer turns
//!   each commit into a single `MapEvent` holding the net change per key.
//! - **Observers**: run after the document is released, one event at a time,
//!   in commit order. A callback may read the map and may start its own
//!   transaction; that event is queued and reaches every observer after the
//!   current one has.
//! - **Broadcast**: each committed write transaction pushes its v1 update to
//!   an optional outbound channel. Updates merged from peers are not.
//!
//! `transact` must not be called from inside another transaction closure.

use super::{KeyChange, MapEvent, Origin, Subscription, PEER_ORIGIN};
use crate::shared::crdt::{self, NODES_MAP};
use crate::shared::error::CollabError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use yrs::types::EntryChange;
use yrs::{Doc, Map, MapRef, Observable, Out, Transact, TransactionMut};

type Observer<V> = Arc<dyn Fn(&MapEvent<V>) + Send + Sync>;

/// Events waiting for delivery
struct Dispatch<V> {
    queue: VecDeque<MapEvent<V>>,
    running: bool,
}

struct Inner<V> {
    doc: Doc,
    map: MapRef,
    /// Serializes every access to `doc`
    guard: Mutex<()>,
    /// Filled by the `yrs` observer while a transaction commits
    staged: Arc<Mutex<Vec<MapEvent<V>>>>,
    dispatch: Mutex<Dispatch<V>>,
    observers: Mutex<Vec<(u64, Observer<V>)>>,
    next_observer: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    _changes: yrs::Subscription,
}

/// Handle to a replica of the node map
pub struct SharedMap<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SharedMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for SharedMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMap")
            .field("client_id", &self.inner.doc.client_id())
            .finish()
    }
}

impl<V> SharedMap<V>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty replica with a random client id
    pub fn new() -> Self {
        Self::from_doc(Doc::new())
    }

    /// Create an empty replica with a fixed client id
    pub fn with_client_id(client_id: u64) -> Self {
        Self::from_doc(Doc::with_client_id(client_id))
    }

    fn from_doc(doc: Doc) -> Self {
        let map = doc.get_or_insert_map(NODES_MAP);
        let staged: Arc<Mutex<Vec<MapEvent<V>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = staged.clone();
        let changes = map.observe(move |txn, event| {
            let changes = net_changes(txn, event);
            if !changes.is_empty() {
                sink.lock().push(MapEvent {
                    origin: Origin::of(txn.origin()),
                    changes,
                });
            }
        });

        Self {
            inner: Arc::new(Inner {
                doc,
                map,
                guard: Mutex::new(()),
                staged,
                dispatch: Mutex::new(Dispatch {
                    queue: VecDeque::new(),
                    running: false,
                }),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(0),
                outbound: Mutex::new(None),
                _changes: changes,
            }),
        }
    }

    /// Client id of this replica's document
    pub fn client_id(&self) -> u64 {
        self.inner.doc.client_id()
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Option<V> {
        let _guard = self.inner.guard.lock();
        let txn = self.inner.doc.transact();
        self.inner.map.get(&txn, key).and_then(|out| decode_out(key, &out))
    }

    /// Whether `key` has a value
    pub fn contains_key(&self, key: &str) -> bool {
        let _guard = self.inner.guard.lock();
        let txn = self.inner.doc.transact();
        self.inner.map.contains_key(&txn, key)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        let _guard = self.inner.guard.lock();
        let txn = self.inner.doc.transact();
        self.inner.map.len(&txn) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all entries, sorted by key
    pub fn entries(&self) -> Vec<(String, V)> {
        let mut entries: Vec<(String, V)> = self.to_map().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Copy of all entries keyed by map key
    pub fn to_map(&self) -> HashMap<String, V> {
        let _guard = self.inner.guard.lock();
        let txn = self.inner.doc.transact();
        self.inner
            .map
            .iter(&txn)
            .filter_map(|(key, out)| decode_out(key, &out).map(|value| (key.to_string(), value)))
            .collect()
    }

    /// Full document state as one v1 update, for handing to a peer
    pub fn snapshot(&self) -> Vec<u8> {
        let _guard = self.inner.guard.lock();
        crdt::encode_state(&self.inner.doc)
    }

    /// Run `f` as one transaction tagged with `origin`.
    ///
    /// Observers see exactly one event for a transaction that changed
    /// anything and none for one that did not.
    pub fn transact<R>(&self, origin: Origin, f: impl FnOnce(&mut Transaction<'_, V>) -> R) -> R {
        let (result, update) = {
            let _guard = self.inner.guard.lock();
            let mut txn = Transaction {
                txn: self.inner.doc.transact_mut_with(origin.tag()),
                map: self.inner.map.clone(),
                written: false,
                _values: PhantomData,
            };
            let result = f(&mut txn);
            let update = txn.finish();
            self.stage();
            (result, update)
        };

        if let Some(update) = update {
            if let Some(outbound) = self.inner.outbound.lock().as_ref() {
                let _ = outbound.send(update);
            }
        }
        self.drain();
        result
    }

    /// Merge a v1 update received from a peer under `Origin::Remote`.
    ///
    /// Returns the number of keys whose value changed. Merged updates are
    /// not pushed to the outbound channel.
    pub fn merge_remote(&self, update: &[u8]) -> Result<usize, CollabError> {
        let changed = {
            let _guard = self.inner.guard.lock();
            crdt::apply_update(&self.inner.doc, update, PEER_ORIGIN)?;
            self.stage()
        };
        self.drain();
        Ok(changed)
    }

    /// Register an observer for committed transactions
    pub fn observe(&self, callback: impl Fn(&MapEvent<V>) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_observer.fetch_add(1, Ordering::SeqCst);
        self.inner.observers.lock().push((id, Arc::new(callback)));

        let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.lock().retain(|(observer_id, _)| *observer_id != id);
            }
        })
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Drop every observer
    pub fn clear_observers(&self) {
        self.inner.observers.lock().clear();
    }

    /// Route updates of local transactions to `sender`, replacing any previous route
    pub fn set_outbound(&self, sender: mpsc::UnboundedSender<Vec<u8>>) {
        *self.inner.outbound.lock() = Some(sender);
    }

    /// Stop routing local updates anywhere
    pub fn clear_outbound(&self) {
        self.inner.outbound.lock().take();
    }

    /// Move staged events to the delivery queue. Called with `guard` held,
    /// so the queue keeps commit order. Returns the number of changed keys.
    fn stage(&self) -> usize {
        let events = std::mem::take(&mut *self.inner.staged.lock());
        let changed = events.iter().map(|event| event.changes.len()).sum();
        if !events.is_empty() {
            self.inner.dispatch.lock().queue.extend(events);
        }
        changed
    }

    /// Deliver queued events unless another call up the stack already is
    fn drain(&self) {
        {
            let mut dispatch = self.inner.dispatch.lock();
            if dispatch.running {
                return;
            }
            dispatch.running = true;
        }
        loop {
            let event = {
                let mut dispatch = self.inner.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        dispatch.running = false;
                        return;
                    }
                }
            };
            let observers: Vec<Observer<V>> = self
                .inner
                .observers
                .lock()
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect();
            for observer in observers {
                observer(&event);
            }
        }
    }
}

impl<V> Default for SharedMap<V>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Write access to the map inside `SharedMap::transact`
pub struct Transaction<'doc, V> {
    txn: TransactionMut<'doc>,
    map: MapRef,
    written: bool,
    _values: PhantomData<V>,
}

impl<'doc, V> Transaction<'doc, V>
where
    V: Serialize + DeserializeOwned + PartialEq,
{
    /// Value of `key`, including writes made earlier in this transaction
    pub fn get(&self, key: &str) -> Option<V> {
        self.map.get(&self.txn, key).and_then(|out| decode_out(key, &out))
    }

    /// Whether `key` has a value
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(&self.txn, key)
    }

    /// All entries as of this point of the transaction
    pub fn iter(&self) -> impl Iterator<Item = (String, V)> + '_ {
        self.map
            .iter(&self.txn)
            .filter_map(|(key, out)| decode_out(key, &out).map(|value| (key.to_string(), value)))
    }

    /// Replace the value of `key`; writing an identical value is a no-op
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if self.get(&key).as_ref() == Some(&value) {
            return;
        }
        match crdt::encode_value(&value) {
            Ok(any) => {
                self.map.insert(&mut self.txn, key, any);
                self.written = true;
            }
            Err(e) => tracing::error!("[Sync] Not writing {}: {}", key, e),
        }
    }

    /// Delete `key`; deleting an absent key is a no-op
    pub fn delete(&mut self, key: &str) -> Option<V> {
        let old = self.get(key)?;
        self.map.remove(&mut self.txn, key);
        self.written = true;
        Some(old)
    }

    /// Commit, returning the v1 update when anything was written
    fn finish(self) -> Option<Vec<u8>> {
        let Transaction { txn, written, .. } = self;
        written.then(|| txn.encode_update_v1())
    }
}

fn decode_out<V: DeserializeOwned>(key: &str, out: &Out) -> Option<V> {
    match out {
        Out::Any(any) => match crdt::decode_value(any) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[Sync] Skipping undecodable value under {}: {}", key, e);
                None
            }
        },
        _ => {
            tracing::warn!("[Sync] Skipping nested shared type under {}", key);
            None
        }
    }
}

/// Net change per key of one committed transaction, sorted by key
fn net_changes<V>(txn: &TransactionMut<'_>, event: &yrs::types::map::MapEvent) -> Vec<KeyChange<V>>
where
    V: DeserializeOwned + PartialEq,
{
    let mut changes: Vec<KeyChange<V>> = event
        .keys(txn)
        .iter()
        .filter_map(|(key, change)| {
            let (old, new) = match change {
                EntryChange::Inserted(new) => (None, decode_out(key, new)),
                EntryChange::Updated(old, new) => (decode_out(key, old), decode_out(key, new)),
                EntryChange::Removed(old) => (decode_out(key, old), None),
            };
            KeyChange::between(key.to_string(), old, new)
        })
        .collect();
    changes.sort_by(|a, b| a.key.cmp(&b.key));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::crdt::ChangeAction;

    fn recorder(map: &SharedMap<i32>) -> (Arc<Mutex<Vec<MapEvent<i32>>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let sub = map.observe(move |event| sink.lock().push(event.clone()));
        (events, sub)
    }

    #[test]
    fn test_transaction_emits_single_event() {
        let map = SharedMap::new();
        let (events, _sub) = recorder(&map);

        map.transact(Origin::Local, |txn| {
            txn.set("a", 1);
            txn.set("a", 2);
            txn.set("b", 3);
        });

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, Origin::Local);
        assert_eq!(events[0].changes.len(), 2);
        assert_eq!(events[0].changes[0].action, ChangeAction::Add);
        assert_eq!(events[0].changes[0].new, Some(2));
    }

    #[test]
    fn test_noop_transaction_is_silent() {
        let map = SharedMap::new();
        map.transact(Origin::Local, |txn| txn.set("a", 1));
        let (events, _sub) = recorder(&map);

        map.transact(Origin::Local, |txn| txn.set("a", 1));
        map.transact(Origin::Local, |txn| {
            txn.set("b", 1);
            txn.delete("b");
        });
        map.transact(Origin::Local, |txn| {
            txn.delete("missing");
        });

        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let map = SharedMap::new();
        let (events, sub) = recorder(&map);
        map.transact(Origin::Local, |txn| txn.set("a", 1));
        drop(sub);
        map.transact(Origin::Local, |txn| txn.set("a", 2));

        assert_eq!(events.lock().len(), 1);
        assert_eq!(map.observer_count(), 0);
    }

    #[test]
    fn test_local_writes_go_outbound_merges_do_not() {
        let a: SharedMap<i32> = SharedMap::with_client_id(1);
        let b: SharedMap<i32> = SharedMap::with_client_id(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        a.set_outbound(tx);

        a.transact(Origin::Local, |txn| txn.set("k", 5));
        let update = rx.try_recv().unwrap();

        assert_eq!(b.merge_remote(&update).unwrap(), 1);
        assert_eq!(b.get("k"), Some(5));

        a.merge_remote(&b.snapshot()).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_tagged_transaction_still_goes_outbound() {
        let map: SharedMap<i32> = SharedMap::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        map.set_outbound(tx);

        map.transact(Origin::Remote, |txn| txn.set("k", 1));
        map.transact(Origin::Local, |txn| txn.set("k", 1));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_merge_remote_is_tagged_remote() {
        let source: SharedMap<i32> = SharedMap::with_client_id(1);
        source.transact(Origin::Local, |txn| txn.set("k", 1));

        let replica: SharedMap<i32> = SharedMap::with_client_id(2);
        let (events, _sub) = recorder(&replica);
        replica.merge_remote(&source.snapshot()).unwrap();

        let events = events.lock();
        assert_eq!(events[0].origin, Origin::Remote);
        assert_eq!(events[0].changes[0].action, ChangeAction::Add);
    }

    #[test]
    fn test_merging_twice_changes_nothing() {
        let source: SharedMap<i32> = SharedMap::with_client_id(1);
        source.transact(Origin::Local, |txn| txn.set("k", 1));
        let replica: SharedMap<i32> = SharedMap::with_client_id(2);

        assert_eq!(replica.merge_remote(&source.snapshot()).unwrap(), 1);
        assert_eq!(replica.merge_remote(&source.snapshot()).unwrap(), 0);
    }

    #[test]
    fn test_garbage_update_is_an_error() {
        let map: SharedMap<i32> = SharedMap::new();
        assert!(map.merge_remote(&[0xff, 0xff, 0xff]).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_local_write_after_merge_wins() {
        let a: SharedMap<i32> = SharedMap::with_client_id(9);
        for value in 0..5 {
            a.transact(Origin::Local, |txn| txn.set("k", value));
        }
        let b: SharedMap<i32> = SharedMap::with_client_id(1);
        b.merge_remote(&a.snapshot()).unwrap();
        b.transact(Origin::Local, |txn| txn.set("k", 100));

        a.merge_remote(&b.snapshot()).unwrap();
        assert_eq!(a.get("k"), Some(100));
    }

    #[test]
    fn test_delete_reports_old_value() {
        let map: SharedMap<i32> = SharedMap::new();
        map.transact(Origin::Local, |txn| txn.set("k", 4));
        let (events, _sub) = recorder(&map);

        let removed = map.transact(Origin::Local, |txn| txn.delete("k"));

        assert_eq!(removed, Some(4));
        let events = events.lock();
        assert_eq!(events[0].changes[0].action, ChangeAction::Delete);
        assert_eq!(events[0].changes[0].old, Some(4));
        assert!(!map.contains_key("k"));
    }

    #[test]
    fn test_observer_may_read_map() {
        let map: SharedMap<i32> = SharedMap::new();
        let reader = map.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let _sub = map.observe(move |_| {
            *sink.lock() = reader.get("a");
        });
        map.transact(Origin::Local, |txn| txn.set("a", 7));
        assert_eq!(*seen.lock(), Some(7));
    }

    #[test]
    fn test_write_from_observer_is_delivered_after_current_event() {
        let map: SharedMap<i32> = SharedMap::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let writer = map.clone();
        let first_log = log.clone();
        let _first = map.observe(move |event| {
            let key = event.changes[0].key.clone();
            first_log.lock().push(format!("first:{}", key));
            if key == "a" {
                writer.transact(Origin::Local, |txn| txn.set("b", 1));
            }
        });
        let second_log = log.clone();
        let _second = map.observe(move |event| {
            second_log.lock().push(format!("second:{}", event.changes[0].key));
        });

        map.transact(Origin::Local, |txn| txn.set("a", 1));

        assert_eq!(
            log.lock().as_slice(),
            &["first:a", "second:a", "first:b", "second:b"]
        );
        assert_eq!(map.get("b"), Some(1));
    }
}
