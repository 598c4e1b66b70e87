//! Relay Transports
//!
//! A session talks to its room through a `RelayLink`: a pair of frame
//! channels plus the background tasks that move frames over the wire. How
//! the link is opened is up to the `RelayConnector`.
//!
//! - `ws::WsConnector` - websocket to a remote relay, JSON text frames
//! - `local::LocalConnector` - in-process `RelayHub`, no network

pub mod local;
pub mod ws;

pub use local::LocalConnector;
pub use ws::WsConnector;

use crate::shared::error::CollabError;
use crate::shared::event::RelayFrame;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Opens links to workspace rooms
pub trait RelayConnector: Send + Sync {
    /// Join room `room_id` of the relay, authenticating with `token`
    fn connect<'a>(&'a self, room_id: &'a str, token: &'a str) -> BoxFuture<'a, Result<RelayLink, CollabError>>;
}

/// Open connection to a relay room
#[derive(Debug)]
pub struct RelayLink {
    /// Frames to send to the room
    pub outbound: mpsc::UnboundedSender<RelayFrame>,
    /// Frames received from the room
    pub inbound: mpsc::UnboundedReceiver<RelayFrame>,
    /// Transport tasks, aborted when dropped
    pub tasks: LinkTasks,
}

/// Background tasks of a link; dropping aborts them
#[derive(Debug, Default)]
pub struct LinkTasks(Vec<JoinHandle<()>>);

impl LinkTasks {
    pub fn new(handles: Vec<JoinHandle<()>>) -> Self {
        Self(handles)
    }

    /// Abort every task now
    pub fn abort(&mut self) {
        for handle in self.0.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for LinkTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Room name of a workspace
pub fn room_id(workspace_id: &str) -> String {
    format!("mindmap:{}", workspace_id)
}

/// Workspace id of a room name, if it is a mind-map room
pub fn workspace_of(room_id: &str) -> Option<&str> {
    room_id.strip_prefix("mindmap:").filter(|id| !id.is_empty())
}
