//! # Presence Channel
//!
//! Ephemeral per-connection state of the peers in a workspace: cursor,
//! identity and chat/typing. Presence travels on the relay link next to node
//! updates but never touches the node map or the REST backend.
//!
//! ## Features
//!
//! - **Per-peer clocks**: each peer's updates carry an increasing clock,
//!   stale ones are ignored
//! - **Chat staleness**: a chat line is visible for `chat_fade_after`, fades
//!   linearly until `chat_expire_after`, then disappears
//! - **Sweeping**: a periodic sweep drops expired chat and peers that have
//!   been silent for longer than `peer_timeout`
//! - **Renewal**: while attached, the local record is re-sent every half
//!   `peer_timeout`, so an idle but connected peer never goes silent

use crate::client::crdt::Subscription;
use crate::shared::config::CollabConfig;
use crate::shared::event::{ChatState, Cursor, Identity, PresenceRecord, PresenceUpdate, RelayFrame};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Drop guard for a presence subscriber
pub type PresenceSubscription = Subscription;

type Subscriber = Arc<dyn Fn(&PresenceEvent) + Send + Sync>;

/// How a chat bubble should be shown
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChatVisibility {
    Visible,
    /// Partially faded, opacity in `0.0..1.0`
    Fading(f64),
    Hidden,
}

/// Change notification for presence subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A peer's record was added or replaced
    Updated { connection_id: String },
    /// A peer left or timed out
    Removed { connection_id: String },
    /// A peer's chat line expired
    ChatExpired { connection_id: String },
    /// The local record changed
    LocalChanged,
}

/// Presence of one remote peer
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub connection_id: String,
    pub clock: u64,
    pub record: PresenceRecord,
    pub last_seen: Instant,
}

/// What a sweep removed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_chats: Vec<String>,
    pub removed_peers: Vec<String>,
}

/// Visibility of a chat line of age `now_ms - chat.timestamp_ms`
pub fn chat_visibility(chat: &ChatState, now_ms: i64, fade_after: Duration, expire_after: Duration) -> ChatVisibility {
    let age = now_ms.saturating_sub(chat.timestamp_ms).max(0) as u128;
    let fade = fade_after.as_millis();
    let expire = expire_after.as_millis();
    if age < fade {
        ChatVisibility::Visible
    } else if age >= expire {
        ChatVisibility::Hidden
    } else {
        let opacity = 1.0 - (age - fade) as f64 / (expire - fade) as f64;
        ChatVisibility::Fading(opacity)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct LocalPresence {
    connection_id: Option<String>,
    clock: u64,
    record: PresenceRecord,
}

struct Inner {
    fade_after: Duration,
    expire_after: Duration,
    peer_timeout: Duration,
    sweep_interval: Duration,
    local: Mutex<LocalPresence>,
    peers: Mutex<HashMap<String, PeerPresence>>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<RelayFrame>>>,
}

/// Presence state of one session
#[derive(Clone)]
pub struct PresenceChannel {
    inner: Arc<Inner>,
}

impl PresenceChannel {
    pub fn new(config: &CollabConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fade_after: config.chat_fade_after,
                expire_after: config.chat_expire_after,
                peer_timeout: config.peer_timeout,
                sweep_interval: config.presence_sweep_interval,
                local: Mutex::new(LocalPresence {
                    connection_id: None,
                    clock: 0,
                    record: PresenceRecord::default(),
                }),
                peers: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                outbound: Mutex::new(None),
            }),
        }
    }

    /// Attach to a live link and publish the current local record
    pub fn attach(&self, connection_id: String, outbound: mpsc::UnboundedSender<RelayFrame>) {
        self.inner.local.lock().connection_id = Some(connection_id);
        *self.inner.outbound.lock() = Some(outbound);
        let has_state = self.inner.local.lock().clock > 0;
        if has_state {
            self.publish();
        }
    }

    /// Detach from the link and forget every remote peer
    pub fn detach(&self) {
        self.inner.outbound.lock().take();
        self.inner.local.lock().connection_id = None;
        let removed: Vec<String> = self.inner.peers.lock().drain().map(|(id, _)| id).collect();
        for connection_id in removed {
            self.notify(&PresenceEvent::Removed { connection_id });
        }
    }

    /// Connection id assigned by the relay, once connected
    pub fn connection_id(&self) -> Option<String> {
        self.inner.local.lock().connection_id.clone()
    }

    /// Copy of the local record
    pub fn local_state(&self) -> PresenceRecord {
        self.inner.local.lock().record.clone()
    }

    pub fn set_cursor(&self, x: f64, y: f64, color: impl Into<String>) {
        self.update_local(|record| {
            record.cursor = Some(Cursor {
                x,
                y,
                color: color.into(),
            })
        });
    }

    /// Hide the local cursor
    pub fn clear_cursor(&self) {
        self.update_local(|record| record.cursor = None);
    }

    pub fn set_chat(&self, text: impl Into<String>, is_typing: bool) {
        self.update_local(|record| {
            record.chat = Some(ChatState {
                is_typing,
                text: text.into(),
                timestamp_ms: now_ms(),
            })
        });
    }

    pub fn clear_chat(&self) {
        self.update_local(|record| record.chat = None);
    }

    pub fn set_identity(&self, identity: Identity) {
        self.update_local(|record| record.identity = identity);
    }

    fn update_local(&self, change: impl FnOnce(&mut PresenceRecord)) {
        {
            let mut local = self.inner.local.lock();
            change(&mut local.record);
            local.clock += 1;
        }
        self.publish();
        self.notify(&PresenceEvent::LocalChanged);
    }

    fn publish(&self) {
        let update = {
            let local = self.inner.local.lock();
            PresenceUpdate {
                connection_id: local.connection_id.clone().unwrap_or_default(),
                clock: local.clock,
                state: Some(local.record.clone()),
            }
        };
        if let Some(outbound) = self.inner.outbound.lock().as_ref() {
            let _ = outbound.send(RelayFrame::Presence { update });
        }
    }

    /// Apply a peer's presence update; returns whether anything changed
    pub fn apply_remote(&self, update: PresenceUpdate) -> bool {
        if self.inner.local.lock().connection_id.as_deref() == Some(update.connection_id.as_str()) {
            return false;
        }
        let event = {
            let mut peers = self.inner.peers.lock();
            if let Some(existing) = peers.get(&update.connection_id) {
                if update.clock <= existing.clock {
                    tracing::trace!(
                        "[Presence] Ignoring stale update from {} ({} <= {})",
                        update.connection_id,
                        update.clock,
                        existing.clock
                    );
                    return false;
                }
            }
            match update.state {
                Some(record) => {
                    peers.insert(
                        update.connection_id.clone(),
                        PeerPresence {
                            connection_id: update.connection_id.clone(),
                            clock: update.clock,
                            record,
                            last_seen: Instant::now(),
                        },
                    );
                    PresenceEvent::Updated {
                        connection_id: update.connection_id,
                    }
                }
                None => {
                    if peers.remove(&update.connection_id).is_none() {
                        return false;
                    }
                    PresenceEvent::Removed {
                        connection_id: update.connection_id,
                    }
                }
            }
        };
        self.notify(&event);
        true
    }

    /// Drop a peer whose connection closed
    pub fn remove_peer(&self, connection_id: &str) -> bool {
        let removed = self.inner.peers.lock().remove(connection_id).is_some();
        if removed {
            tracing::debug!("[Presence] Peer {} left", connection_id);
            self.notify(&PresenceEvent::Removed {
                connection_id: connection_id.to_string(),
            });
        }
        removed
    }

    /// Current remote peers, sorted by connection id
    pub fn peers(&self) -> Vec<PeerPresence> {
        let mut peers: Vec<PeerPresence> = self.inner.peers.lock().values().cloned().collect();
        peers.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        peers
    }

    /// Presence of one peer
    pub fn peer(&self, connection_id: &str) -> Option<PeerPresence> {
        self.inner.peers.lock().get(connection_id).cloned()
    }

    /// Chat visibility of a peer right now
    pub fn chat_visibility(&self, connection_id: &str) -> ChatVisibility {
        self.chat_visibility_at(connection_id, now_ms())
    }

    /// Chat visibility of a peer at wall-clock time `now_ms`
    pub fn chat_visibility_at(&self, connection_id: &str, now_ms: i64) -> ChatVisibility {
        let peers = self.inner.peers.lock();
        match peers.get(connection_id).and_then(|peer| peer.record.chat.as_ref()) {
            Some(chat) => chat_visibility(chat, now_ms, self.inner.fade_after, self.inner.expire_after),
            None => ChatVisibility::Hidden,
        }
    }

    /// Run one sweep at the current time
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(now_ms(), Instant::now())
    }

    /// Run one sweep: expire chat lines older than `chat_expire_after` and
    /// drop peers not heard from within `peer_timeout`
    pub fn sweep_at(&self, now_ms: i64, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        {
            let mut peers = self.inner.peers.lock();
            peers.retain(|connection_id, peer| {
                if now.saturating_duration_since(peer.last_seen) > self.inner.peer_timeout {
                    report.removed_peers.push(connection_id.clone());
                    return false;
                }
                let expired = peer.record.chat.as_ref().is_some_and(|chat| {
                    chat_visibility(chat, now_ms, self.inner.fade_after, self.inner.expire_after)
                        == ChatVisibility::Hidden
                });
                if expired {
                    peer.record.chat = None;
                    report.expired_chats.push(connection_id.clone());
                }
                true
            });
        }
        report.removed_peers.sort();
        report.expired_chats.sort();

        for connection_id in &report.removed_peers {
            tracing::debug!("[Presence] Peer {} timed out", connection_id);
            self.notify(&PresenceEvent::Removed {
                connection_id: connection_id.clone(),
            });
        }
        for connection_id in &report.expired_chats {
            self.notify(&PresenceEvent::ChatExpired {
                connection_id: connection_id.clone(),
            });
        }
        report
    }

    /// Sweep every `presence_sweep_interval` until the channel is dropped
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PresenceChannel { inner }.sweep();
            }
        })
    }

    /// Re-send the local record under a new clock.
    ///
    /// Returns `false` when detached or when nothing was ever published.
    pub fn renew(&self) -> bool {
        {
            let mut local = self.inner.local.lock();
            if local.connection_id.is_none() || local.clock == 0 {
                return false;
            }
            local.clock += 1;
        }
        self.publish();
        true
    }

    /// Renew every half `peer_timeout` until the channel is dropped
    pub fn spawn_renewer(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = (self.inner.peer_timeout / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if (PresenceChannel { inner }).renew() {
                    tracing::trace!("[Presence] Renewed local state");
                }
            }
        })
    }

    /// Register a change callback
    pub fn subscribe(&self, callback: impl Fn(&PresenceEvent) + Send + Sync + 'static) -> PresenceSubscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    fn notify(&self, event: &PresenceEvent) {
        let subscribers: Vec<Subscriber> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            subscriber(event);
        }
    }
}
