//! Events accepted by the session store

use crate::presence::{PresencePeer, PresenceStatus, PresenceUpdate};
use crate::types::{Address, AddressType};

use super::model::{ChatMessage, NameSource, PeerListing, TransportPeer};

/// Every state change the session store knows how to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Latest transport peer listing
    PeersSnapshot(Vec<PeerListing>),
    /// A naming back-end produced a verified name
    NameResolved {
        peer: Address,
        source: NameSource,
        name: String,
    },
    /// Chat message for the conversation with `peer`, inbound or sent by us
    MessageReceived { peer: Address, message: ChatMessage },
    ChatOpened(Address),
    ChatClosed(Address),
    /// Full presence roster
    PresenceRoster(Vec<PresencePeer>),
    PresenceJoined(PresencePeer),
    PresenceLeft(Address),
    PresenceStatusChanged {
        peer: Address,
        status: PresenceStatus,
    },
    /// This layer asked the transport to dial `peer`
    ConnectRequested {
        peer: Address,
        address_type: AddressType,
    },
    /// The transport rejected a dial announced by `ConnectRequested`
    ///
    /// Carries the entries as they were before the request so the store can
    /// put them back.
    ConnectFailed {
        peer: Address,
        previous: Option<TransportPeer>,
        presence_status: Option<PresenceStatus>,
    },
    /// The overlay session was torn down
    SessionReset,
}

impl SessionEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::PeersSnapshot(_) => "peers-snapshot",
            SessionEvent::NameResolved { .. } => "name-resolved",
            SessionEvent::MessageReceived { .. } => "message-received",
            SessionEvent::ChatOpened(_) => "chat-opened",
            SessionEvent::ChatClosed(_) => "chat-closed",
            SessionEvent::PresenceRoster(_) => "presence-roster",
            SessionEvent::PresenceJoined(_) => "presence-joined",
            SessionEvent::PresenceLeft(_) => "presence-left",
            SessionEvent::PresenceStatusChanged { .. } => "presence-status-changed",
            SessionEvent::ConnectRequested { .. } => "connect-requested",
            SessionEvent::ConnectFailed { .. } => "connect-failed",
            SessionEvent::SessionReset => "session-reset",
        }
    }
}

impl From<PresenceUpdate> for SessionEvent {
    fn from(update: PresenceUpdate) -> Self {
        match update {
            PresenceUpdate::Joined(peer) => SessionEvent::PresenceJoined(peer),
            PresenceUpdate::Left(address) => SessionEvent::PresenceLeft(address),
            PresenceUpdate::Roster(peers) => SessionEvent::PresenceRoster(peers),
        }
    }
}
