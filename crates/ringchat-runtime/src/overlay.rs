//! Overlay transport boundary
//!
//! The rings overlay client (DHT, ICE, encryption) is an external collaborator.
//! This module defines the calls the session layer makes into it and the
//! endpoint settings it is constructed with.

use std::sync::Arc;

use async_trait::async_trait;
use ringchat_core::{Address, AddressType, Identity, PeerListing, Result, TransportId};
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Handshake and Inbound Types
// ----------------------------------------------------------------------------

/// Offer or answer descriptor exchanged out of band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub transport_id: TransportId,
    pub blob: String,
}

/// Raw message delivered by the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// First hop of the relay path, i.e. the sender
    pub from: String,
    pub payload: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Client Traits
// ----------------------------------------------------------------------------

/// Connected overlay client
#[async_trait]
pub trait OverlayClient: Send + Sync {
    async fn list_peers(&self) -> Result<Vec<PeerListing>>;

    async fn connect_with_address(&self, address: &Address, address_type: AddressType)
        -> Result<()>;

    async fn create_offer(&self) -> Result<Offer>;

    /// Answer a remote offer; the returned id names the new pending link
    async fn answer_offer(&self, blob: &str) -> Result<Offer>;

    async fn accept_answer(&self, transport_id: &TransportId, blob: &str) -> Result<()>;

    async fn send_message(&self, address: &Address, payload: &[u8]) -> Result<()>;

    async fn disconnect(&self, address: &Address, address_type: AddressType) -> Result<()>;

    /// Register the sink for inbound messages
    async fn listen(&self, sink: mpsc::Sender<InboundMessage>) -> Result<()>;

    /// Join the overlay through a bootstrap node
    async fn connect_peer_via_http(&self, url: &str) -> Result<()>;
}

/// Builds an overlay client from a signed identity
#[async_trait]
pub trait OverlayConnector: Send + Sync {
    async fn connect(
        &self,
        identity: &Identity,
        signature: &[u8],
        relay_url: &str,
    ) -> Result<Arc<dyn OverlayClient>>;
}

// ----------------------------------------------------------------------------
// Endpoints
// ----------------------------------------------------------------------------

/// Relay and bootstrap endpoints a session is built against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub relay_url: String,
    pub bootstrap_urls: Vec<String>,
}

impl Endpoints {
    /// Build from the persisted relay URL and `;`-separated bootstrap list
    pub fn parse(relay_url: &str, bootstrap: &str) -> Self {
        Self {
            relay_url: relay_url.trim().to_string(),
            bootstrap_urls: bootstrap
                .split(';')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Whether both a relay and at least one bootstrap node are configured
    pub fn is_complete(&self) -> bool {
        !self.relay_url.is_empty() && !self.bootstrap_urls.is_empty()
    }
}
