//! Mindmap Collab - Main Library
//!
//! State synchronization core of a collaborative mind-map editor. Every
//! participant of a workspace holds a replica of the node map; replicas
//! converge through a relay, and a REST backend stays the durable store.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared between client and relay
//!   - Nodes, REST DTOs, relay frames, presence records
//!   - Yjs document helpers
//!   - Configuration and error types
//!
//! - **`client`** - Everything running next to an editor
//!   - `yrs`-backed replicated map with transactions and observers
//!   - Session client, presence channel, mutation facade
//!   - Bootstrap from REST and the persistence bridge back to it
//!   - Keep-children deletes with deferred reattachment
//!
//! - **`relay`** - Room hub that fans frames out between peers
//!   - `relay::server` (feature `server`) serves it over axum websockets
//!
//! # Feature Flags
//!
//! - **`server`** - builds the axum relay server and the `mindmap-relay`
//!   binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use mindmap_collab::client::{LocalConnector, SessionClient};
//! use mindmap_collab::shared::{CollabConfig, Node};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), mindmap_collab::shared::CollabError> {
//! let client = SessionClient::new(Arc::new(LocalConnector::default()), CollabConfig::default());
//! let session = client.connect("42", "token").await?;
//! session.crud().create(Node::new("Central idea").at(2500.0, 2500.0));
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - Map, presence and session handles are `Send + Sync` and cheap to clone
//! - Observers run synchronously after each transaction, outside the map lock
//! - Backend calls run on tokio tasks owned by the persistence bridge

/// Shared types and data structures
pub mod shared;

/// Client-side collaboration state
pub mod client;

/// Relay hub and server
pub mod relay;
