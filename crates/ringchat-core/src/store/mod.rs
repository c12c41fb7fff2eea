//! Session state store
//!
//! The system of record for peer connection state, presence, chat history and
//! UI focus. All mutation goes through [`SessionStore::apply`], which handles
//! one [`SessionEvent`] at a time.
//!
//! Presence entries and transport peers are kept in two separate maps. They
//! come from sources with different authority and are only merged at read time
//! by [`SessionStore::display_name`].

pub mod events;
pub mod model;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::presence::{PresencePeer, PresenceStatus};
use crate::types::{Address, AddressType};

pub use events::SessionEvent;
pub use model::{
    ChatMessage, ChatSession, FocusState, NameSource, PeerListing, ReadStatus, TransportPeer,
    TransportState,
};

// ----------------------------------------------------------------------------
// Session Store
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStore {
    transport_peers: BTreeMap<Address, TransportPeer>,
    presence: BTreeMap<Address, PresencePeer>,
    chats: BTreeMap<Address, ChatSession>,
    focus: FocusState,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event
    pub fn apply(&mut self, event: SessionEvent) {
        trace!(event = event.kind(), "applying session event");

        match event {
            SessionEvent::PeersSnapshot(listings) => self.apply_peers_snapshot(listings),
            SessionEvent::NameResolved { peer, source, name } => {
                self.apply_name_resolved(&peer, source, name)
            }
            SessionEvent::MessageReceived { peer, message } => {
                self.apply_message_received(peer, message)
            }
            SessionEvent::ChatOpened(peer) => self.apply_chat_opened(peer),
            SessionEvent::ChatClosed(peer) => self.apply_chat_closed(&peer),
            SessionEvent::PresenceRoster(peers) => self.apply_presence_roster(peers),
            SessionEvent::PresenceJoined(peer) => self.apply_presence_joined(peer),
            SessionEvent::PresenceLeft(peer) => {
                self.presence.remove(&peer);
            }
            SessionEvent::PresenceStatusChanged { peer, status } => {
                if let Some(entry) = self.presence.get_mut(&peer) {
                    entry.status = status;
                }
            }
            SessionEvent::ConnectRequested { peer, address_type } => {
                self.apply_connect_requested(peer, address_type)
            }
            SessionEvent::ConnectFailed {
                peer,
                previous,
                presence_status,
            } => self.apply_connect_failed(peer, previous, presence_status),
            SessionEvent::SessionReset => {
                for peer in self.transport_peers.values_mut() {
                    peer.state = TransportState::Disconnected;
                }
            }
        }
    }

    fn apply_peers_snapshot(&mut self, listings: Vec<PeerListing>) {
        let listed: BTreeSet<&Address> = listings.iter().map(|l| &l.address).collect();

        for (address, peer) in self.transport_peers.iter_mut() {
            if !listed.contains(address) {
                peer.state = TransportState::Disconnected;
            }
        }

        for listing in &listings {
            match self.transport_peers.get_mut(&listing.address) {
                Some(existing) => {
                    existing.address_type = listing.address_type;
                    existing.transport_id = Some(listing.transport_id.clone());
                    existing.state = listing.state;
                }
                None => {
                    self.transport_peers
                        .insert(listing.address.clone(), TransportPeer::from_listing(listing));
                }
            }
        }
    }

    fn apply_name_resolved(&mut self, peer: &Address, source: NameSource, name: String) {
        if let Some(entry) = self.transport_peers.get_mut(peer) {
            match source {
                NameSource::Ens => entry.ens = name.clone(),
                NameSource::Bns => entry.bns = name.clone(),
            }
        }
        if let Some(entry) = self.presence.get_mut(peer) {
            match source {
                NameSource::Ens => entry.ens = name,
                NameSource::Bns => entry.bns = name,
            }
        }
    }

    fn apply_message_received(&mut self, peer: Address, message: ChatMessage) {
        let focused = self.focus.active_peer.as_ref() == Some(&peer);
        let chat = self
            .chats
            .entry(peer.clone())
            .or_insert_with(|| ChatSession::new(peer));
        chat.messages.push(message);
        chat.read_status = if focused {
            ReadStatus::Read
        } else {
            ReadStatus::Unread
        };
    }

    fn apply_chat_opened(&mut self, peer: Address) {
        let chat = self
            .chats
            .entry(peer.clone())
            .or_insert_with(|| ChatSession::new(peer.clone()));
        chat.read_status = ReadStatus::Read;

        if !self.focus.active_peers.contains(&peer) {
            self.focus.active_peers.push(peer.clone());
        }
        self.focus.active_peer = Some(peer);
    }

    fn apply_chat_closed(&mut self, peer: &Address) {
        self.focus.active_peers.retain(|p| p != peer);
        if self.focus.active_peer.as_ref() == Some(peer) {
            self.focus.active_peer = self.focus.active_peers.last().cloned();
        }

        if self
            .chats
            .get(peer)
            .is_some_and(|chat| chat.messages.is_empty())
        {
            self.chats.remove(peer);
        }
    }

    fn apply_presence_roster(&mut self, peers: Vec<PresencePeer>) {
        let mut previous = std::mem::take(&mut self.presence);
        for mut peer in peers {
            // Names already resolved for a peer survive a roster refresh
            if let Some(old) = previous.remove(&peer.address) {
                peer.ens = old.ens;
                peer.bns = old.bns;
            }
            self.presence.insert(peer.address.clone(), peer);
        }
    }

    fn apply_presence_joined(&mut self, peer: PresencePeer) {
        match self.presence.get_mut(&peer.address) {
            Some(existing) => existing.address_type = peer.address_type,
            None => {
                self.presence.insert(peer.address.clone(), peer);
            }
        }
    }

    fn apply_connect_requested(&mut self, peer: Address, address_type: AddressType) {
        match self.transport_peers.get_mut(&peer) {
            Some(existing) => {
                if existing.state == TransportState::Disconnected {
                    existing.state = TransportState::Connecting;
                }
            }
            None => {
                self.transport_peers.insert(
                    peer.clone(),
                    TransportPeer {
                        name: peer.short(),
                        address: peer.clone(),
                        address_type,
                        transport_id: None,
                        state: TransportState::Connecting,
                        ens: String::new(),
                        bns: String::new(),
                    },
                );
            }
        }

        if let Some(entry) = self.presence.get_mut(&peer) {
            if entry.status == PresenceStatus::Idle {
                entry.status = PresenceStatus::Connecting;
            }
        }
    }

    /// Undo a connect request, unless a listing has since reported the peer connected
    fn apply_connect_failed(
        &mut self,
        peer: Address,
        previous: Option<TransportPeer>,
        presence_status: Option<PresenceStatus>,
    ) {
        let connected = self
            .transport_peers
            .get(&peer)
            .is_some_and(|p| p.state == TransportState::Connected);
        if !connected {
            match previous {
                Some(previous) => {
                    self.transport_peers.insert(peer.clone(), previous);
                }
                None => {
                    self.transport_peers.remove(&peer);
                }
            }
        }

        if let (Some(status), Some(entry)) = (presence_status, self.presence.get_mut(&peer)) {
            if entry.status == PresenceStatus::Connecting {
                entry.status = status;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn transport_peers(&self) -> &BTreeMap<Address, TransportPeer> {
        &self.transport_peers
    }

    pub fn transport_peer(&self, address: &Address) -> Option<&TransportPeer> {
        self.transport_peers.get(address)
    }

    pub fn presence(&self) -> &BTreeMap<Address, PresencePeer> {
        &self.presence
    }

    pub fn presence_peer(&self, address: &Address) -> Option<&PresencePeer> {
        self.presence.get(address)
    }

    pub fn chats(&self) -> &BTreeMap<Address, ChatSession> {
        &self.chats
    }

    pub fn chat(&self, address: &Address) -> Option<&ChatSession> {
        self.chats.get(address)
    }

    pub fn focus(&self) -> &FocusState {
        &self.focus
    }

    /// Peers with unread messages
    pub fn unread_peers(&self) -> Vec<&Address> {
        self.chats
            .values()
            .filter(|chat| chat.read_status == ReadStatus::Unread)
            .map(|chat| &chat.peer)
            .collect()
    }

    /// Name to render for a peer
    ///
    /// A resolved name beats a plain one. Among resolved names `ens` beats
    /// `bns` and presence beats transport; the same source order applies to
    /// plain names. Falls back to the abbreviated address.
    pub fn display_name(&self, address: &Address) -> String {
        let presence = self.presence.get(address);
        let transport = self.transport_peers.get(address);

        let resolved = [
            presence.map(|p| p.ens.as_str()),
            presence.map(|p| p.bns.as_str()),
            transport.map(|p| p.ens.as_str()),
            transport.map(|p| p.bns.as_str()),
        ];
        let plain = [
            presence.map(|p| p.name.as_str()),
            transport.map(|p| p.name.as_str()),
        ];

        resolved
            .into_iter()
            .chain(plain)
            .flatten()
            .find(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| address.short())
    }

    /// Known peers, from either map, that still lack a name from `source`
    pub fn peers_missing_name(&self, source: NameSource) -> Vec<Address> {
        let field = |ens: &str, bns: &str| match source {
            NameSource::Ens => ens.is_empty(),
            NameSource::Bns => bns.is_empty(),
        };

        let missing: BTreeSet<&Address> = self
            .transport_peers
            .values()
            .filter(|p| field(&p.ens, &p.bns))
            .map(|p| &p.address)
            .chain(
                self.presence
                    .values()
                    .filter(|p| field(&p.ens, &p.bns))
                    .map(|p| &p.address),
            )
            .collect();

        missing.into_iter().cloned().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
