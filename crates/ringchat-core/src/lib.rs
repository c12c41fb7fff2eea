//! Ringchat Core
//!
//! Domain model for a wallet-authenticated chat client running over the rings
//! overlay network: canonical addresses, wallet identity resolution, the
//! presence wire codec and the session store reducer. Nothing here performs
//! I/O; the async orchestration lives in `ringchat-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod identity;
pub mod presence;
pub mod store;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{PresenceConfig, SessionConfig};
pub use errors::{Result, RingchatError};
pub use identity::{
    ChainPriority, Identity, IdentityResolver, SignatureScheme, UnsignedChallenge,
    WalletAdapter, WalletSignature,
};
pub use presence::{Announcement, PresencePeer, PresenceStatus, PresenceUpdate};
pub use store::{
    ChatMessage, ChatSession, FocusState, NameSource, PeerListing, ReadStatus, SessionEvent,
    SessionStore, TransportPeer, TransportState,
};
pub use types::{Address, AddressType, Chain, TransportId};
