/**
 * Relay Room Hub
 *
 * In-memory rooms of the relay. Each room keeps a `yrs` document with the
 * merged node map of its peers, their latest presence and one frame channel
 * per connection.
 *
 * # Fan-out
 *
 * - `Update` frames are applied to the room document, then sent to every
 *   other peer; an update the room cannot decode is dropped
 * - `Presence` frames replace the sender's stored presence, then fan out
 * - `Control` frames fan out unchanged
 * - leaving sends `PeerLeft` to the remaining peers
 *
 * A room is dropped when its last peer leaves; the next joiner starts empty
 * and seeds from the REST backend.
 */
use crate::shared::crdt;
use crate::shared::event::{PresenceUpdate, RelayFrame};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use yrs::Doc;

#[cfg(feature = "server")]
pub mod server;

/// Sender half handed to the hub for one connection
pub type PeerSender = mpsc::UnboundedSender<RelayFrame>;

/// Transaction origin of updates applied by the relay
const RELAY_ORIGIN: &str = "relay";

struct Room {
    doc: Doc,
    presence: HashMap<String, PresenceUpdate>,
    peers: HashMap<String, PeerSender>,
}

impl Room {
    fn new() -> Self {
        Self {
            doc: Doc::new(),
            presence: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    fn fan_out(&mut self, from: &str, frame: &RelayFrame) -> usize {
        let mut delivered = 0;
        self.peers.retain(|connection_id, sender| {
            if connection_id == from {
                return true;
            }
            match sender.send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }
}

/// Room and peer counts
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RelayStats {
    pub rooms: usize,
    pub peers: usize,
}

/// Shared hub of relay rooms
#[derive(Clone, Default)]
pub struct RelayHub {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
    next_connection: Arc<AtomicU64>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to `room_id`.
    ///
    /// The peer's first frame is a `Welcome` carrying its connection id, the
    /// room snapshot and the presence of everyone already there.
    pub fn join(&self, room_id: &str, sender: PeerSender) -> String {
        let connection_id = format!(
            "conn-{}",
            self.next_connection.fetch_add(1, Ordering::SeqCst) + 1
        );
        let mut rooms = self.rooms.lock();
        let room = rooms.entry(room_id.to_string()).or_insert_with(Room::new);

        let welcome = RelayFrame::Welcome {
            connection_id: connection_id.clone(),
            snapshot: crdt::encode_state(&room.doc),
            presence: room.presence.values().cloned().collect(),
        };
        if sender.send(welcome).is_ok() {
            room.peers.insert(connection_id.clone(), sender);
        }
        tracing::info!(
            "[Relay] {} joined {} ({} peers)",
            connection_id,
            room_id,
            room.peers.len()
        );
        connection_id
    }

    /// Handle a frame sent by `connection_id`
    pub fn handle(&self, room_id: &str, connection_id: &str, frame: RelayFrame) {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            tracing::warn!("[Relay] Frame for unknown room {}", room_id);
            return;
        };

        match frame {
            RelayFrame::Update { update } => {
                if let Err(e) = crdt::apply_update(&room.doc, &update, RELAY_ORIGIN) {
                    tracing::warn!("[Relay] Dropping update from {}: {}", connection_id, e);
                    return;
                }
                let delivered = room.fan_out(connection_id, &RelayFrame::Update { update });
                tracing::debug!(
                    "[Relay] {} updated {}, forwarded to {} peers",
                    connection_id,
                    room_id,
                    delivered
                );
            }
            RelayFrame::Presence { mut update } => {
                update.connection_id = connection_id.to_string();
                if update.state.is_some() {
                    room.presence.insert(connection_id.to_string(), update.clone());
                } else {
                    room.presence.remove(connection_id);
                }
                room.fan_out(connection_id, &RelayFrame::Presence { update });
            }
            frame @ RelayFrame::Control { .. } => {
                let delivered = room.fan_out(connection_id, &frame);
                tracing::info!("[Relay] Control notice delivered to {} peers", delivered);
            }
            other => {
                tracing::debug!("[Relay] Ignoring client {} frame", other.kind());
            }
        }
    }

    /// Remove a peer and tell the others
    pub fn leave(&self, room_id: &str, connection_id: &str) {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        room.peers.remove(connection_id);
        room.presence.remove(connection_id);
        room.fan_out(
            connection_id,
            &RelayFrame::PeerLeft {
                connection_id: connection_id.to_string(),
            },
        );
        tracing::info!("[Relay] {} left {}", connection_id, room_id);

        if room.peers.is_empty() {
            rooms.remove(room_id);
            tracing::info!("[Relay] Room {} closed", room_id);
        }
    }

    /// Number of nodes in a room's document
    pub fn node_count(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .get(room_id)
            .map(|room| crdt::node_count(&room.doc))
            .unwrap_or(0)
    }

    /// Room and peer counts
    pub fn stats(&self) -> RelayStats {
        let rooms = self.rooms.lock();
        RelayStats {
            rooms: rooms.len(),
            peers: rooms.values().map(|room| room.peers.len()).sum(),
        }
    }
}
