//! Shared Error Types
//!
//! This module defines the error types used across the collaboration core.
//!
//! # Error Categories
//!
//! - `SharedError` - serialization and validation failures on wire data
//! - `ApiError` - failures talking to the mind-map REST backend
//! - `CollabError` - session, mutation and coordination failures
//!
//! # Usage
//!
//! ```rust
//! use mindmap_collab::shared::error::SharedError;
//!
//! let error = SharedError::validation("keyword", "Keyword cannot be empty");
//! assert!(error.to_string().contains("keyword"));
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be moved out of spawned tasks.
use thiserror::Error;

/// Errors on data crossing a process boundary
#[derive(Debug, Error, Clone)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

/// Errors returned by the REST client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, or the status text when the body was unreadable
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the backend rejected the caller's credentials
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Errors raised by the collaboration core
#[derive(Debug, Error)]
pub enum CollabError {
    /// The relay did not confirm the connection within the timeout window
    #[error("Connection to workspace '{workspace_id}' not confirmed after {after_ms}ms")]
    ConnectTimeout {
        /// Workspace being joined
        workspace_id: String,
        /// Timeout that elapsed
        after_ms: u64,
    },

    /// The relay link closed before or during the session
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The transport failed to open or to carry a frame
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session was destroyed and can no longer be used
    #[error("Session for workspace '{0}' has been destroyed")]
    SessionDestroyed(String),

    /// A REST call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Wire data could not be handled
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// A node referenced by an operation does not exist
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// A reparent would make a node its own ancestor
    #[error("Moving node '{node_id}' under '{parent_id}' would create a cycle")]
    CycleDetected {
        /// Node being moved
        node_id: String,
        /// Requested parent
        parent_id: String,
    },

    /// A server id was already attached to the node
    #[error("Node '{node_id}' already has server id {existing}")]
    ServerIdAlreadyAssigned {
        /// Client id of the node
        node_id: String,
        /// Server id already attached
        existing: i64,
    },
}

impl From<serde_json::Error> for CollabError {
    fn from(err: serde_json::Error) -> Self {
        Self::Shared(err.into())
    }
}
