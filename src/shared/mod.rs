//! Shared Module
//!
//! Types shared by the client side of the sync core and the relay. Everything
//! here is plain data that crosses a process boundary: the node model, REST
//! DTOs, Yjs document helpers and relay frames, plus the error and configuration
//! types both sides use.

/// Mind-map node model
pub mod node;

/// REST request and response shapes
pub mod dto;

/// Relay wire frames and presence records
pub mod event;

/// Shared error types
pub mod error;

/// Yjs document helpers
pub mod crdt;

/// Collaboration configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{CollabConfig, CollabConfigBuilder, ConfigError};
pub use crdt::NODES_MAP;
pub use dto::{CreateNodeRequest, NodeDto, UpdateNodeRequest};
pub use error::{ApiError, CollabError, SharedError};
pub use event::{ControlMessage, PresenceRecord, PresenceUpdate, RelayFrame};
pub use node::{AnalysisStatus, Node, NodeType};
