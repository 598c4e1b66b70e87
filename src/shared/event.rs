/**
 * Relay Wire Events
 *
 * Frames exchanged between a session and the relay over one room
 * connection. Node state and presence travel on the same socket but as
 * distinct frame kinds, so presence never reaches the node map.
 *
 * # Frame Types
 *
 * - `Welcome` - sent once to a joining peer with its connection id,
 *   the room's node snapshot and everyone's current presence
 * - `Update` - a Yjs v1 update of the node map
 * - `Presence` - one peer's presence record (or its removal)
 * - `PeerLeft` - a peer's connection closed
 * - `Control` - workspace-level notices such as role changes
 */
use serde::{Deserialize, Serialize};

/// One frame on a relay connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    /// First frame a joining peer receives
    Welcome {
        /// Id the relay assigned to this connection
        connection_id: String,
        /// Room node state as one v1 update
        snapshot: Vec<u8>,
        /// Current presence of the other peers
        presence: Vec<PresenceUpdate>,
    },
    /// Node map change made by a peer
    Update {
        /// v1-encoded update
        update: Vec<u8>,
    },
    /// Presence change of one peer
    Presence {
        /// The change
        update: PresenceUpdate,
    },
    /// A peer's connection closed
    PeerLeft {
        /// Connection that went away
        connection_id: String,
    },
    /// Workspace-level notice
    Control {
        /// The notice
        message: ControlMessage,
    },
}

impl RelayFrame {
    /// Short frame kind name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RelayFrame::Welcome { .. } => "welcome",
            RelayFrame::Update { .. } => "update",
            RelayFrame::Presence { .. } => "presence",
            RelayFrame::PeerLeft { .. } => "peer_left",
            RelayFrame::Control { .. } => "control",
        }
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Workspace role of a member
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkspaceRole {
    Master,
    Editor,
    Viewer,
}

/// Workspace visibility
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkspaceVisibility {
    Public,
    Private,
}

/// Control notice relayed to every member of a room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    /// A member's role changed
    RoleChanged {
        /// Affected user
        user_id: String,
        /// New role
        role: WorkspaceRole,
    },
    /// The workspace visibility changed
    VisibilityChanged {
        /// New visibility
        visibility: WorkspaceVisibility,
    },
}

/// Cursor position of a peer on the canvas
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    pub color: String,
}

/// Who a peer is
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<WorkspaceRole>,
}

/// Typing indicator and last chat line of a peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    /// Whether the peer is currently typing
    pub is_typing: bool,
    /// Current or last sent text
    pub text: String,
    /// Wall-clock time of the last chat change, milliseconds since epoch
    pub timestamp_ms: i64,
}

/// Ephemeral per-connection presence
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PresenceRecord {
    #[serde(default)]
    pub cursor: Option<Cursor>,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub chat: Option<ChatState>,
}

/// Presence change for one connection.
///
/// `clock` increases with every change the owner publishes; `state: None`
/// removes the peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceUpdate {
    pub connection_id: String,
    pub clock: u64,
    pub state: Option<PresenceRecord>,
}
