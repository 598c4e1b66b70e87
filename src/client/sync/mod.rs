//! # Persistence Sync Bridge
//!
//! Projects local edits of the node map onto the REST backend.
//!
//! ## Architecture
//!
//! A map observer forwards every local transaction to a single worker task
//! over a FIFO channel, so changes are handled in the order they were made.
//! The worker owns all bookkeeping; backend calls run as spawned tasks that
//! report back to the worker when they settle.
//!
//! - **add**: create unless the node already has a server id. The server id
//!   is merged back under `Origin::Remote`. A child whose parent is not
//!   durable yet waits for the parent's create.
//! - **update**: only for durable nodes and only when something significant
//!   changed. Position-only changes are debounced per node and sent with the
//!   value current when the timer fires.
//! - **delete**: only for durable nodes.
//!
//! At most one call per node is in flight. Work arriving meanwhile is queued
//! (latest wins, delete supersedes update) and issued once the call settles.
//! Failures are logged and counted; nothing is rolled back or retried.

pub mod metrics;
pub mod significance;

pub use metrics::{BridgeMetrics, CallKind};
pub use significance::{classify, Significance};

use crate::client::api::MindmapApi;
use crate::client::crdt::{ChangeAction, KeyChange, Origin, SharedMap, Subscription};
use crate::shared::config::CollabConfig;
use crate::shared::dto::{CreateNodeRequest, UpdateNodeRequest};
use crate::shared::error::{ApiError, CollabError};
use crate::shared::node::Node;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Attach a server id to the node stored under `key`.
///
/// Runs as an `Origin::Remote` transaction so the bridge does not project it
/// again. Returns `Ok(false)` when the node is gone or already carries the
/// same id, and `ServerIdAlreadyAssigned` when it carries a different one.
pub fn attach_server_id(map: &SharedMap<Node>, key: &str, server_id: i64) -> Result<bool, CollabError> {
    map.transact(Origin::Remote, |txn| {
        let Some(current) = txn.get(key) else {
            return Ok(false);
        };
        match current.server_id {
            Some(existing) if existing == server_id => Ok(false),
            Some(existing) => Err(CollabError::ServerIdAlreadyAssigned {
                node_id: key.to_string(),
                existing,
            }),
            None => {
                let mut node = current;
                node.server_id = Some(server_id);
                txn.set(key, node);
                Ok(true)
            }
        }
    })
}

enum BridgeMessage {
    Changes(Vec<KeyChange<Node>>),
    DebounceFired { key: String, generation: u64 },
    Settled { key: String, outcome: CallOutcome },
}

enum CallOutcome {
    Created(Result<i64, ApiError>),
    Updated(Result<(), ApiError>),
    Deleted(Result<(), ApiError>),
}

/// Work waiting for a node's in-flight call to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Create,
    Update,
    Delete(i64),
}

/// Handle of a running bridge; dropping it stops the worker and its timers
pub struct PersistenceBridge {
    workspace_id: String,
    metrics: Arc<Mutex<BridgeMetrics>>,
    worker: JoinHandle<()>,
    _subscription: Subscription,
}

impl PersistenceBridge {
    /// Start projecting local changes of `map` for `workspace_id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        workspace_id: impl Into<String>,
        map: SharedMap<Node>,
        api: Arc<dyn MindmapApi>,
        config: &CollabConfig,
    ) -> Self {
        let workspace_id = workspace_id.into();
        let metrics = Arc::new(Mutex::new(BridgeMetrics::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<BridgeMessage>();

        let observer_tx = tx.clone();
        let observer_metrics = metrics.clone();
        let subscription = map.observe(move |event| {
            if event.origin != Origin::Local {
                observer_metrics.lock().ignored_events += 1;
                return;
            }
            let _ = observer_tx.send(BridgeMessage::Changes(event.changes.clone()));
        });

        let mut worker = Worker {
            workspace_id: workspace_id.clone(),
            api,
            map,
            debounce: config.update_debounce,
            threshold: config.position_threshold,
            tx,
            metrics: metrics.clone(),
            in_flight: HashSet::new(),
            pending: HashMap::new(),
            creating: HashMap::new(),
            deferred: HashMap::new(),
            timers: HashMap::new(),
            next_generation: 0,
        };
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                worker.handle(message);
            }
        });
        tracing::info!("[Sync] Persistence bridge started for workspace {}", workspace_id);

        Self {
            workspace_id,
            metrics,
            worker: handle,
            _subscription: subscription,
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Snapshot of the bridge counters
    pub fn metrics(&self) -> BridgeMetrics {
        self.metrics.lock().clone()
    }
}

impl Drop for PersistenceBridge {
    fn drop(&mut self) {
        self.worker.abort();
        tracing::info!("[Sync] Persistence bridge stopped for workspace {}", self.workspace_id);
    }
}

struct Worker {
    workspace_id: String,
    api: Arc<dyn MindmapApi>,
    map: SharedMap<Node>,
    debounce: Duration,
    threshold: f64,
    tx: mpsc::UnboundedSender<BridgeMessage>,
    metrics: Arc<Mutex<BridgeMetrics>>,
    in_flight: HashSet<String>,
    pending: HashMap<String, Pending>,
    /// Value sent with each in-flight create
    creating: HashMap<String, Node>,
    /// Children waiting for their parent's create, keyed by parent
    deferred: HashMap<String, Vec<String>>,
    timers: HashMap<String, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl Drop for Worker {
    fn drop(&mut self) {
        for (_, (_, timer)) in self.timers.drain() {
            timer.abort();
        }
    }
}

impl Worker {
    fn handle(&mut self, message: BridgeMessage) {
        match message {
            BridgeMessage::Changes(changes) => {
                for change in changes {
                    self.handle_change(change);
                }
            }
            BridgeMessage::DebounceFired { key, generation } => {
                let current = self.timers.get(&key).map(|(g, _)| *g);
                if current == Some(generation) {
                    self.timers.remove(&key);
                    self.request_update(&key);
                }
            }
            BridgeMessage::Settled { key, outcome } => self.settle(key, outcome),
        }
    }

    fn handle_change(&mut self, change: KeyChange<Node>) {
        let key = change.key;
        match change.action {
            ChangeAction::Add => {
                let Some(node) = change.new else { return };
                if node.server_id.is_some() {
                    tracing::debug!("[Sync] {} already durable, no create", key);
                    return;
                }
                if self.in_flight.contains(&key) {
                    self.queue(&key, Pending::Create);
                } else {
                    self.start_create(&key);
                }
            }
            ChangeAction::Update => {
                let (Some(old), Some(new)) = (change.old, change.new) else {
                    return;
                };
                if new.server_id.is_none() {
                    // An in-flight create sends a follow-up when it settles
                    if !self.creating.contains_key(&key) {
                        self.metrics.lock().skipped_not_durable += 1;
                        tracing::debug!("[Sync] Skip update of {}: no server id yet", key);
                    }
                    return;
                }
                match classify(&old, &new, self.threshold) {
                    Significance::Unchanged => {
                        self.metrics.lock().suppressed_changes += 1;
                    }
                    Significance::PositionOnly => self.schedule_debounce(&key),
                    Significance::Content => {
                        self.cancel_timer(&key);
                        self.request_update(&key);
                    }
                }
            }
            ChangeAction::Delete => {
                self.cancel_timer(&key);
                self.drop_deferred_child(&key);
                let Some(server_id) = change.old.and_then(|old| old.server_id) else {
                    if !self.creating.contains_key(&key) {
                        self.metrics.lock().skipped_not_durable += 1;
                        tracing::debug!("[Sync] Skip delete of {}: never persisted", key);
                    }
                    return;
                };
                if self.in_flight.contains(&key) {
                    self.queue(&key, Pending::Delete(server_id));
                } else {
                    self.start_delete(&key, server_id);
                }
            }
        }
    }

    fn queue(&mut self, key: &str, work: Pending) {
        let next = match (self.pending.get(key), work) {
            (Some(Pending::Delete(sid)), Pending::Update) => Pending::Delete(*sid),
            (_, work) => work,
        };
        self.pending.insert(key.to_string(), next);
    }

    fn request_update(&mut self, key: &str) {
        if self.in_flight.contains(key) {
            self.queue(key, Pending::Update);
        } else {
            self.start_update(key);
        }
    }

    fn schedule_debounce(&mut self, key: &str) {
        if let Some((_, previous)) = self.timers.remove(key) {
            previous.abort();
            self.metrics.lock().coalesced_updates += 1;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.tx.clone();
        let delay = self.debounce;
        let timer_key = key.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(BridgeMessage::DebounceFired {
                key: timer_key,
                generation,
            });
        });
        self.timers.insert(key.to_string(), (generation, timer));
    }

    fn cancel_timer(&mut self, key: &str) {
        if let Some((_, timer)) = self.timers.remove(key) {
            timer.abort();
        }
    }

    fn parent_server_id(&self, node: &Node) -> Result<Option<i64>, String> {
        let Some(parent_id) = node.parent_id.as_deref() else {
            return Ok(None);
        };
        match self.map.get(parent_id) {
            Some(parent) => parent.server_id.map(Some).ok_or_else(|| parent_id.to_string()),
            None => Ok(None),
        }
    }

    fn start_create(&mut self, key: &str) {
        let Some(node) = self.map.get(key) else {
            return;
        };
        if node.server_id.is_some() {
            return;
        }
        let parent_server_id = match self.parent_server_id(&node) {
            Ok(sid) => sid,
            Err(parent_id) => {
                tracing::debug!("[Sync] Deferring create of {} until {} is persisted", key, parent_id);
                self.metrics.lock().deferred_creates += 1;
                let waiting = self.deferred.entry(parent_id).or_default();
                if !waiting.iter().any(|k| k == key) {
                    waiting.push(key.to_string());
                }
                return;
            }
        };

        let request = CreateNodeRequest::from_node(&node, parent_server_id);
        self.creating.insert(key.to_string(), node);
        self.spawn_call(key, CallKind::Create, move |api, workspace_id| {
            Box::pin(async move {
                CallOutcome::Created(api.create_node(&workspace_id, request).await.map(|dto| dto.node_id))
            })
        });
    }

    fn start_update(&mut self, key: &str) {
        let Some(node) = self.map.get(key) else {
            return;
        };
        let Some(server_id) = node.server_id else {
            return;
        };
        let mut request = UpdateNodeRequest::from_node(&node, None);
        request.parent_id = match self.parent_server_id(&node) {
            Ok(parent) => Some(parent),
            // Parent not persisted yet; leave the backend's parent alone
            Err(_) => None,
        };
        self.spawn_call(key, CallKind::Update, move |api, workspace_id| {
            Box::pin(async move { CallOutcome::Updated(api.update_node(&workspace_id, server_id, request).await) })
        });
    }

    fn start_delete(&mut self, key: &str, server_id: i64) {
        self.spawn_call(key, CallKind::Delete, move |api, workspace_id| {
            Box::pin(async move { CallOutcome::Deleted(api.delete_node(&workspace_id, server_id).await) })
        });
    }

    fn spawn_call<F>(&mut self, key: &str, kind: CallKind, call: F)
    where
        F: FnOnce(Arc<dyn MindmapApi>, String) -> futures_util::future::BoxFuture<'static, CallOutcome>
            + Send
            + 'static,
    {
        self.in_flight.insert(key.to_string());
        let started = self.metrics.lock().record_call_start(kind);
        tracing::debug!("[Sync] {:?} {} in workspace {}", kind, key, self.workspace_id);

        let api = self.api.clone();
        let workspace_id = self.workspace_id.clone();
        let tx = self.tx.clone();
        let metrics = self.metrics.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = call(api, workspace_id).await;
            if outcome.is_ok() {
                metrics.lock().record_call_success(started);
            } else {
                metrics.lock().record_call_failure();
            }
            let _ = tx.send(BridgeMessage::Settled { key, outcome });
        });
    }

    fn settle(&mut self, key: String, outcome: CallOutcome) {
        self.in_flight.remove(&key);
        match outcome {
            CallOutcome::Created(result) => self.settle_create(&key, result),
            CallOutcome::Updated(Err(e)) => {
                tracing::error!("[Sync] Update of {} failed: {}", key, e);
            }
            CallOutcome::Deleted(Err(e)) => {
                tracing::error!("[Sync] Delete of {} failed: {}", key, e);
            }
            CallOutcome::Updated(Ok(())) | CallOutcome::Deleted(Ok(())) => {}
        }

        if self.in_flight.contains(&key) {
            return;
        }
        match self.pending.remove(&key) {
            Some(Pending::Create) => self.start_create(&key),
            Some(Pending::Update) => self.start_update(&key),
            Some(Pending::Delete(server_id)) => self.start_delete(&key, server_id),
            None => {}
        }
    }

    fn settle_create(&mut self, key: &str, result: Result<i64, ApiError>) {
        let sent = self.creating.remove(key);
        let server_id = match result {
            Ok(server_id) => server_id,
            Err(e) => {
                tracing::error!("[Sync] Create of {} failed: {}", key, e);
                if let Some(children) = self.deferred.remove(key) {
                    tracing::warn!(
                        "[Sync] Dropping {} creates waiting on {}",
                        children.len(),
                        key
                    );
                }
                return;
            }
        };
        tracing::info!("[Sync] Created {} as server node {}", key, server_id);

        match attach_server_id(&self.map, key, server_id) {
            Ok(true) => {
                let current = self.map.get(key);
                let changed = match (sent.as_ref(), current.as_ref()) {
                    (Some(sent), Some(current)) => classify(sent, current, self.threshold) != Significance::Unchanged,
                    _ => false,
                };
                if changed {
                    // Edits made while the create was in flight
                    self.pending.remove(key);
                    self.start_update(key);
                }
            }
            Ok(false) => {
                if !self.map.contains_key(key) {
                    tracing::info!("[Sync] {} was deleted during its create, deleting {}", key, server_id);
                    self.pending.remove(key);
                    self.start_delete(key, server_id);
                }
            }
            Err(e) => {
                tracing::warn!("[Sync] Ignoring second server id {} for {}: {}", server_id, key, e);
            }
        }

        if let Some(children) = self.deferred.remove(key) {
            for child in children {
                if !self.in_flight.contains(&child) {
                    self.start_create(&child);
                }
            }
        }
    }

    fn drop_deferred_child(&mut self, key: &str) {
        for waiting in self.deferred.values_mut() {
            waiting.retain(|k| k != key);
        }
        self.deferred.retain(|_, waiting| !waiting.is_empty());
    }
}

impl CallOutcome {
    fn is_ok(&self) -> bool {
        match self {
            CallOutcome::Created(result) => result.is_ok(),
            CallOutcome::Updated(result) | CallOutcome::Deleted(result) => result.is_ok(),
        }
    }
}
