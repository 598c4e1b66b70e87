/**
 * Relay Server
 *
 * Serves a `RelayHub` over axum websockets.
 *
 * # Routes
 *
 * - `GET /ws?workspace=<id>&token=<token>` - join the room of a workspace;
 *   JSON text frames both ways
 * - `GET /health` - liveness probe
 * - `GET /stats` - room and peer counts
 *
 * A socket without a workspace is closed with a policy-violation frame.
 * Token checks are left to the REST backend; the relay only routes frames.
 */
use super::RelayHub;
use crate::client::transport::room_id;
use crate::shared::event::RelayFrame;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

const POLICY_VIOLATION: u16 = 1008;

/// Query parameters of a websocket upgrade
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    pub workspace: Option<String>,
    pub token: Option<String>,
}

/// Build the relay router around `hub`
pub fn create_router(hub: RelayHub) -> Router<()> {
    Router::new()
        .route("/ws", get(handle_upgrade))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn stats(State(hub): State<RelayHub>) -> impl IntoResponse {
    Json(hub.stats())
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(hub): State<RelayHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        match params.workspace.filter(|id| !id.is_empty()) {
            Some(workspace_id) => serve_peer(socket, hub, room_id(&workspace_id)).await,
            None => reject(socket).await,
        }
    })
}

async fn reject(mut socket: WebSocket) {
    tracing::warn!("[Relay] Rejecting socket without workspace");
    let frame = CloseFrame {
        code: POLICY_VIOLATION,
        reason: "workspace required".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Pump one socket to and from its room until either side closes
async fn serve_peer(socket: WebSocket, hub: RelayHub, room: String) {
    let (mut sink, mut stream) = socket.split();
    let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<RelayFrame>();
    let connection_id = hub.join(&room, peer_tx);

    let writer = tokio::spawn(async move {
        while let Some(frame) = peer_rx.recv().await {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("[Relay] Failed to encode {} frame: {}", frame.kind(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match RelayFrame::from_json(text.as_str()) {
                Ok(frame) => hub.handle(&room, &connection_id, frame),
                Err(e) => tracing::warn!("[Relay] Bad frame from {}: {}", connection_id, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("[Relay] Socket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    hub.leave(&room, &connection_id);
    writer.abort();
}
