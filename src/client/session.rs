//! # Session Client
//!
//! Owns the relay connection of one workspace and the replicated state that
//! rides on it.
//!
//! ## Features
//!
//! - **Confirmed connect**: `connect` returns only after the relay's
//!   `Welcome` arrived, or fails with `ConnectTimeout`
//! - **Frame pumps**: inbound frames feed the node map and the presence
//!   channel; local map transactions go out as `Update` frames
//! - **Control notices**: role and visibility changes drop the cached
//!   permission state and are re-published to subscribers
//! - **Token refresh**: `reconnect` swaps the link under the same map
//! - **Teardown**: `destroy` is idempotent and also runs on drop
//!
//! ## Connection State
//!
//! `Connecting` -> `Connected` on `Welcome`, `Failed` when the handshake
//! fails, `Closed` after `disconnect`, `destroy` or a relay-side close.

use crate::client::crdt::SharedMap;
use crate::client::crud::MutationFacade;
use crate::client::presence::PresenceChannel;
use crate::client::transport::{room_id, LinkTasks, RelayConnector, RelayLink};
use crate::shared::config::CollabConfig;
use crate::shared::error::CollabError;
use crate::shared::event::{ControlMessage, PresenceUpdate, RelayFrame, WorkspaceRole};
use crate::shared::node::Node;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of a session's relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// Opens sessions through a `RelayConnector`
pub struct SessionClient {
    connector: Arc<dyn RelayConnector>,
    config: CollabConfig,
}

impl SessionClient {
    pub fn new(connector: Arc<dyn RelayConnector>, config: CollabConfig) -> Self {
        Self { connector, config }
    }

    /// Join the room of `workspace_id`.
    ///
    /// Resolves once the relay sent its `Welcome`; the room snapshot is
    /// already merged into `Session::nodes` by then.
    pub async fn connect(&self, workspace_id: &str, auth_token: &str) -> Result<Session, CollabError> {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (control_tx, _) = broadcast::channel(CONTROL_CHANNEL_CAPACITY);
        let session = Session {
            workspace_id: workspace_id.to_string(),
            connector: self.connector.clone(),
            config: self.config.clone(),
            nodes: SharedMap::new(),
            presence: PresenceChannel::new(&self.config),
            state: Arc::new(state_tx),
            control: control_tx,
            role: Arc::new(Mutex::new(None)),
            link: Mutex::new(None),
            presence_tasks: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        };

        tracing::info!("[Session] Connecting to workspace {}", workspace_id);
        let handshake = open_link(&*self.connector, &self.config, workspace_id, auth_token).await;
        match handshake {
            Ok(handshake) => {
                session.install(handshake, false);
                session
                    .presence_tasks
                    .lock()
                    .extend([session.presence.spawn_sweeper(), session.presence.spawn_renewer()]);
                Ok(session)
            }
            Err(e) => {
                tracing::error!("[Session] Connect to {} failed: {}", workspace_id, e);
                session.state.send_replace(ConnectionState::Failed);
                Err(e)
            }
        }
    }
}

/// Link that completed the handshake
struct Handshake {
    link: RelayLink,
    connection_id: String,
    snapshot: Vec<u8>,
    presence: Vec<PresenceUpdate>,
}

/// Link in use plus the pumps serving it
struct ActiveLink {
    outbound: mpsc::UnboundedSender<RelayFrame>,
    // Field order matters: pumps stop before the transport.
    _pumps: LinkTasks,
    _transport: LinkTasks,
}

/// Connect and wait for the `Welcome`, all within `connect_timeout`
async fn open_link(
    connector: &dyn RelayConnector,
    config: &CollabConfig,
    workspace_id: &str,
    token: &str,
) -> Result<Handshake, CollabError> {
    let room = room_id(workspace_id);
    let handshake = async {
        let mut link = connector.connect(&room, token).await?;
        loop {
            match link.inbound.recv().await {
                Some(RelayFrame::Welcome {
                    connection_id,
                    snapshot,
                    presence,
                }) => {
                    return Ok(Handshake {
                        link,
                        connection_id,
                        snapshot,
                        presence,
                    })
                }
                Some(other) => {
                    tracing::debug!("[Session] Ignoring {} frame before welcome", other.kind());
                }
                None => {
                    return Err(CollabError::ConnectionClosed(format!(
                        "relay closed {} before welcome",
                        room
                    )))
                }
            }
        }
    };

    match tokio::time::timeout(config.connect_timeout, handshake).await {
        Ok(result) => result,
        // The pending link is dropped with the future, which tears it down.
        Err(_) => Err(CollabError::ConnectTimeout {
            workspace_id: workspace_id.to_string(),
            after_ms: config.connect_timeout.as_millis() as u64,
        }),
    }
}

/// A live workspace session
pub struct Session {
    workspace_id: String,
    connector: Arc<dyn RelayConnector>,
    config: CollabConfig,
    nodes: SharedMap<Node>,
    presence: PresenceChannel,
    state: Arc<watch::Sender<ConnectionState>>,
    control: broadcast::Sender<ControlMessage>,
    role: Arc<Mutex<Option<WorkspaceRole>>>,
    link: Mutex<Option<ActiveLink>>,
    /// Presence sweeper and renewer
    presence_tasks: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl Session {
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// The replicated node map
    pub fn nodes(&self) -> &SharedMap<Node> {
        &self.nodes
    }

    /// The presence channel of this connection
    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    /// Mutation facade over the node map
    pub fn crud(&self) -> MutationFacade {
        MutationFacade::new(self.nodes.clone())
    }

    /// Connection id assigned by the relay
    pub fn connection_id(&self) -> Option<String> {
        self.presence.connection_id()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Control notices received from the relay
    pub fn subscribe_control(&self) -> broadcast::Receiver<ControlMessage> {
        self.control.subscribe()
    }

    /// Cached role of the local user, cleared by control notices
    pub fn cached_role(&self) -> Option<WorkspaceRole> {
        *self.role.lock()
    }

    pub fn set_cached_role(&self, role: WorkspaceRole) {
        *self.role.lock() = Some(role);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Broadcast a control notice to the other peers of the room
    pub fn send_message(&self, message: ControlMessage) -> Result<(), CollabError> {
        if self.is_destroyed() {
            return Err(CollabError::SessionDestroyed(self.workspace_id.clone()));
        }
        let link = self.link.lock();
        let Some(active) = link.as_ref() else {
            return Err(CollabError::ConnectionClosed("session is not connected".to_string()));
        };
        active
            .outbound
            .send(RelayFrame::Control { message })
            .map_err(|_| CollabError::ConnectionClosed("relay link closed".to_string()))
    }

    /// Re-open the link with a fresh token.
    ///
    /// The node map is kept: the new snapshot is merged and the full local
    /// state is pushed back to the room.
    pub async fn reconnect(&self, auth_token: &str) -> Result<(), CollabError> {
        if self.is_destroyed() {
            return Err(CollabError::SessionDestroyed(self.workspace_id.clone()));
        }
        self.teardown_link();
        self.state.send_replace(ConnectionState::Connecting);
        tracing::info!("[Session] Reconnecting to workspace {}", self.workspace_id);

        match open_link(&*self.connector, &self.config, &self.workspace_id, auth_token).await {
            Ok(handshake) => {
                self.install(handshake, true);
                Ok(())
            }
            Err(e) => {
                tracing::error!("[Session] Reconnect to {} failed: {}", self.workspace_id, e);
                self.state.send_replace(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    /// Close the link; the map stays readable
    pub fn disconnect(&self) {
        if self.teardown_link() {
            tracing::info!("[Session] Disconnected from workspace {}", self.workspace_id);
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    /// Tear the session down for good. Safe to call more than once.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown_link();
        for task in self.presence_tasks.lock().drain(..) {
            task.abort();
        }
        self.state.send_replace(ConnectionState::Closed);
        tracing::info!("[Session] Destroyed session for workspace {}", self.workspace_id);
    }

    fn install(&self, handshake: Handshake, push_local: bool) {
        let Handshake {
            link,
            connection_id,
            snapshot,
            presence,
        } = handshake;
        let RelayLink {
            outbound,
            mut inbound,
            tasks,
        } = link;

        let merged = self.nodes.merge_remote(&snapshot).unwrap_or_else(|e| {
            tracing::error!("[Session] Room snapshot for {} rejected: {}", self.workspace_id, e);
            0
        });
        self.presence.attach(connection_id.clone(), outbound.clone());
        for update in presence {
            self.presence.apply_remote(update);
        }

        let (map_tx, mut map_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.nodes.set_outbound(map_tx);
        if push_local {
            let _ = outbound.send(RelayFrame::Update {
                update: self.nodes.snapshot(),
            });
        }

        let frames = outbound.clone();
        let outbound_pump = tokio::spawn(async move {
            while let Some(update) = map_rx.recv().await {
                if frames.send(RelayFrame::Update { update }).is_err() {
                    break;
                }
            }
        });

        let nodes = self.nodes.clone();
        let presence_channel = self.presence.clone();
        let control = self.control.clone();
        let role = self.role.clone();
        let state = self.state.clone();
        let workspace_id = self.workspace_id.clone();
        let inbound_pump = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                match frame {
                    RelayFrame::Update { update } => {
                        if let Err(e) = nodes.merge_remote(&update) {
                            tracing::warn!("[Session] Dropping update for {}: {}", workspace_id, e);
                        }
                    }
                    RelayFrame::Presence { update } => {
                        presence_channel.apply_remote(update);
                    }
                    RelayFrame::PeerLeft { connection_id } => {
                        presence_channel.remove_peer(&connection_id);
                    }
                    RelayFrame::Control { message } => {
                        tracing::info!("[Session] Control notice for {}: {:?}", workspace_id, message);
                        role.lock().take();
                        let _ = control.send(message);
                    }
                    RelayFrame::Welcome { snapshot, .. } => {
                        if let Err(e) = nodes.merge_remote(&snapshot) {
                            tracing::warn!("[Session] Dropping snapshot for {}: {}", workspace_id, e);
                        }
                    }
                }
            }
            tracing::warn!("[Session] Relay closed the link for {}", workspace_id);
            nodes.clear_outbound();
            presence_channel.detach();
            state.send_replace(ConnectionState::Closed);
        });

        *self.link.lock() = Some(ActiveLink {
            outbound,
            _pumps: LinkTasks::new(vec![inbound_pump, outbound_pump]),
            _transport: tasks,
        });
        self.state.send_replace(ConnectionState::Connected);
        tracing::info!(
            "[Session] Connected to workspace {} as {} ({} keys merged)",
            self.workspace_id,
            connection_id,
            merged
        );
    }

    /// Drop the active link; returns whether there was one
    fn teardown_link(&self) -> bool {
        let active = self.link.lock().take();
        self.nodes.clear_outbound();
        self.presence.detach();
        active.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}
