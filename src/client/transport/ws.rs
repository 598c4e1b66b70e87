//! Websocket transport.
//!
//! Connects to `{relay_url}/ws?workspace={id}&token={token}` and carries
//! `RelayFrame`s as JSON text messages. One task writes, one task reads;
//! both stop when the socket closes or the link is dropped.

use super::{workspace_of, LinkTasks, RelayConnector, RelayLink};
use crate::client::config::ClientConfig;
use crate::shared::error::CollabError;
use crate::shared::event::RelayFrame;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Websocket `RelayConnector`
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl RelayConnector for WsConnector {
    fn connect<'a>(&'a self, room_id: &'a str, token: &'a str) -> BoxFuture<'a, Result<RelayLink, CollabError>> {
        Box::pin(async move {
            let workspace_id = workspace_of(room_id)
                .ok_or_else(|| CollabError::Transport(format!("not a mind-map room: {}", room_id)))?;
            let url = self
                .config
                .relay_url_for(workspace_id, token)
                .map_err(|e| CollabError::Transport(e.to_string()))?;

            tracing::debug!("[Session] Opening websocket for room {}", room_id);
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| CollabError::Transport(e.to_string()))?;
            let (mut ws_tx, mut ws_rx) = stream.split();

            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<RelayFrame>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<RelayFrame>();

            let writer = tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let text = match frame.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("[Session] Failed to encode {} frame: {}", frame.kind(), e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_tx.close().await;
            });

            let room = room_id.to_string();
            let reader = tokio::spawn(async move {
                while let Some(message) = ws_rx.next().await {
                    match message {
                        Ok(Message::Text(text)) => match RelayFrame::from_json(text.as_str()) {
                            Ok(frame) => {
                                if inbound_tx.send(frame).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("[Session] Dropping undecodable frame: {}", e),
                        },
                        Ok(Message::Close(reason)) => {
                            tracing::info!("[Session] Relay closed room {}: {:?}", room, reason);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("[Session] Websocket error in room {}: {}", room, e);
                            break;
                        }
                    }
                }
            });

            Ok(RelayLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
                tasks: LinkTasks::new(vec![writer, reader]),
            })
        })
    }
}
