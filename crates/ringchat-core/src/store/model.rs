//! Records held by the session store

use serde::{Deserialize, Serialize};

use crate::types::{Address, AddressType, TransportId};

// ----------------------------------------------------------------------------
// Transport Peers
// ----------------------------------------------------------------------------

/// Link state of a peer known to the overlay transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
}

/// One entry of a transport peer listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListing {
    pub address: Address,
    pub address_type: AddressType,
    pub transport_id: TransportId,
    pub state: TransportState,
}

/// A peer the transport has reported at least once
///
/// Entries are never removed; a peer missing from a later listing is marked
/// [`TransportState::Disconnected`]. The one exception is an entry created by
/// a connect request the transport then rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPeer {
    pub address: Address,
    pub address_type: AddressType,
    pub transport_id: Option<TransportId>,
    pub state: TransportState,
    pub name: String,
    pub ens: String,
    pub bns: String,
}

impl TransportPeer {
    pub(crate) fn from_listing(listing: &PeerListing) -> Self {
        Self {
            name: listing.address.short(),
            address: listing.address.clone(),
            address_type: listing.address_type,
            transport_id: Some(listing.transport_id.clone()),
            state: listing.state,
            ens: String::new(),
            bns: String::new(),
        }
    }
}

// ----------------------------------------------------------------------------
// Names
// ----------------------------------------------------------------------------

/// Naming back-end a resolved name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameSource {
    Ens,
    Bns,
}

impl std::fmt::Display for NameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameSource::Ens => f.write_str("ens"),
            NameSource::Bns => f.write_str("bns"),
        }
    }
}

// ----------------------------------------------------------------------------
// Chats
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Read,
    Unread,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: Address,
    pub to: Address,
    pub text: String,
}

/// Message history with one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub peer: Address,
    pub messages: Vec<ChatMessage>,
    pub read_status: ReadStatus,
}

impl ChatSession {
    pub(crate) fn new(peer: Address) -> Self {
        Self {
            peer,
            messages: Vec::new(),
            read_status: ReadStatus::Read,
        }
    }
}

// ----------------------------------------------------------------------------
// Focus
// ----------------------------------------------------------------------------

/// Open chat tabs and the focused one
///
/// `active_peer` is always `None` or an element of `active_peers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub active_peer: Option<Address>,
    pub active_peers: Vec<Address>,
}
