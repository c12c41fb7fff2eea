//! Ringchat Runtime
//!
//! Async orchestration for the ringchat session layer:
//! - `StoreHandle`: the task that owns the session store
//! - `PresenceChannel`: websocket link to the presence service
//! - `NameResolver`: verified name lookups pushed into the store
//! - `ConnectionOrchestrator`: overlay session lifecycle and peer operations
//!
//! `ringchat-core` provides the data model; this crate wires it to tokio.

pub mod naming;
pub mod orchestrator;
pub mod overlay;
pub mod presence;
pub mod store_task;

pub use naming::{NameResolver, NameService};
pub use orchestrator::{ConnectionOrchestrator, SessionPhase};
pub use overlay::{Endpoints, InboundMessage, Offer, OverlayClient, OverlayConnector};
pub use presence::{ChannelState, LocalPresence, PresenceChannel};
pub use store_task::{SessionView, StoreHandle};

// Re-export core types for convenience
pub use ringchat_core::{
    Address, AddressType, Identity, Result, RingchatError, SessionConfig, SessionEvent,
    SessionStore,
};
