//! In-process transport.
//!
//! Joins rooms of a `RelayHub` living in the same process. Used by tests and
//! by embedders that host the relay themselves.

use super::{LinkTasks, RelayConnector, RelayLink};
use crate::relay::RelayHub;
use crate::shared::error::CollabError;
use crate::shared::event::RelayFrame;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// `RelayConnector` over an in-process hub
#[derive(Clone, Default)]
pub struct LocalConnector {
    hub: RelayHub,
}

impl LocalConnector {
    pub fn new(hub: RelayHub) -> Self {
        Self { hub }
    }

    /// The hub links are opened against
    pub fn hub(&self) -> &RelayHub {
        &self.hub
    }
}

impl RelayConnector for LocalConnector {
    fn connect<'a>(&'a self, room_id: &'a str, _token: &'a str) -> BoxFuture<'a, Result<RelayLink, CollabError>> {
        Box::pin(async move {
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<RelayFrame>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<RelayFrame>();

            let connection_id = self.hub.join(room_id, inbound_tx);
            let hub = self.hub.clone();
            let room = room_id.to_string();

            // Runs until the link's sender is dropped, then leaves the room.
            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    hub.handle(&room, &connection_id, frame);
                }
                hub.leave(&room, &connection_id);
            });

            Ok(RelayLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
                tasks: LinkTasks::default(),
            })
        })
    }
}
