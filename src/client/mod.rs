//! # Collaboration Client
//!
//! Everything a front end needs to edit a shared mind map.
//!
//! ## Modules
//!
//! - `crdt` - `yrs`-backed replicated map with transactions and observers
//! - `session` - relay connection of one workspace
//! - `crud` - typed node edits
//! - `presence` - cursors, identity and chat of the peers
//! - `bootstrap` - exactly-once seeding from REST
//! - `sync` - projection of local edits onto REST
//! - `detach` - keep-children deletes and reattachment
//! - `api` - REST client
//! - `transport` - websocket and in-process relay links

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod crdt;
pub mod crud;
pub mod detach;
pub mod layout;
pub mod presence;
pub mod session;
pub mod sync;
pub mod transport;

pub use api::{HttpMindmapApi, MindmapApi};
pub use bootstrap::{BootstrapCoordinator, BootstrapOutcome, BootstrapReport};
pub use config::ClientConfig;
pub use crdt::{ChangeAction, KeyChange, MapEvent, Origin, SharedMap, Subscription};
pub use crud::MutationFacade;
pub use detach::{DetachedSelection, DetachmentResolver, DetachmentState};
pub use layout::{LayoutEngine, RadialLayout};
pub use presence::{ChatVisibility, PresenceChannel, PresenceEvent, PresenceSubscription};
pub use session::{ConnectionState, Session, SessionClient};
pub use sync::{attach_server_id, PersistenceBridge};
pub use transport::{LocalConnector, RelayConnector, WsConnector};
