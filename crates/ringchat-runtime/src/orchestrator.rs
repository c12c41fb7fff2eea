//! Connection orchestrator
//!
//! Drives one overlay session through its lifecycle:
//!
//! ```text
//! uninitialized -> awaiting-identity -> authenticating -> bootstrapping -> ready
//!                                                  \             \
//!                                                   +-> faulted   +-> faulted
//! ready -> torn-down
//! ```
//!
//! [`ConnectionOrchestrator::sync`] is the only way in: callers hand it the
//! current identity and endpoints whenever either changes and the
//! orchestrator reconciles the session against them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ringchat_core::{
    Address, AddressType, ChatMessage, Identity, Result, RingchatError, SessionEvent,
    TransportId, TransportState,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::naming::NameResolver;
use crate::overlay::{Endpoints, InboundMessage, Offer, OverlayClient, OverlayConnector};
use crate::store_task::StoreHandle;

const INBOUND_BUFFER_SIZE: usize = 64;

// ----------------------------------------------------------------------------
// Session Phase
// ----------------------------------------------------------------------------

/// Lifecycle phase of the overlay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    AwaitingIdentity,
    Authenticating,
    Bootstrapping,
    Ready,
    Faulted,
    TornDown,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::AwaitingIdentity => "awaiting-identity",
            SessionPhase::Authenticating => "authenticating",
            SessionPhase::Bootstrapping => "bootstrapping",
            SessionPhase::Ready => "ready",
            SessionPhase::Faulted => "faulted",
            SessionPhase::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Active Session
// ----------------------------------------------------------------------------

struct ActiveSession {
    client: Arc<dyn OverlayClient>,
    pending_offers: HashSet<TransportId>,
    pending_answers: HashSet<TransportId>,
    tasks: Vec<JoinHandle<()>>,
}

impl ActiveSession {
    fn new(client: Arc<dyn OverlayClient>) -> Self {
        Self {
            client,
            pending_offers: HashSet::new(),
            pending_answers: HashSet::new(),
            tasks: Vec::new(),
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Orchestrator
// ----------------------------------------------------------------------------

pub struct ConnectionOrchestrator {
    connector: Arc<dyn OverlayConnector>,
    store: StoreHandle,
    names: Option<NameResolver>,
    poll_interval: Duration,
    phase: watch::Sender<SessionPhase>,
    /// Identity and endpoints the current session was built from
    applied: Option<(Identity, Endpoints)>,
    session: Option<ActiveSession>,
}

impl ConnectionOrchestrator {
    pub fn new(
        connector: Arc<dyn OverlayConnector>,
        store: StoreHandle,
        poll_interval: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Uninitialized);
        Self {
            connector,
            store,
            names: None,
            poll_interval,
            phase,
            applied: None,
            session: None,
        }
    }

    /// Look up names for peers on every poll
    pub fn with_name_resolver(mut self, names: NameResolver) -> Self {
        self.names = Some(names);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn phase_watch(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            info!(from = %previous, to = %phase, "session phase changed");
        }
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Reconcile the session with the current identity and endpoints
    ///
    /// An identity without a signature, or incomplete endpoints, parks the
    /// session in `AwaitingIdentity` without contacting the transport. A change
    /// of credentials or endpoints while ready tears the session down and
    /// starts over; a new display name alone does not.
    pub async fn sync(&mut self, identity: &Identity, endpoints: &Endpoints) -> Result<SessionPhase> {
        let signature = match (&identity.address, &identity.signature) {
            (Some(_), Some(signature)) if endpoints.is_complete() => signature.clone(),
            _ => {
                if self.session.is_some() {
                    self.teardown().await;
                }
                self.applied = None;
                self.set_phase(SessionPhase::AwaitingIdentity);
                return Ok(SessionPhase::AwaitingIdentity);
            }
        };

        let unchanged = self
            .applied
            .as_ref()
            .is_some_and(|(i, e)| i.same_credentials(identity) && e == endpoints);
        if unchanged && self.phase() == SessionPhase::Ready {
            self.applied = Some((identity.clone(), endpoints.clone()));
            return Ok(SessionPhase::Ready);
        }

        if self.session.is_some() {
            info!("session inputs changed, re-authenticating");
            self.teardown().await;
        }

        self.applied = Some((identity.clone(), endpoints.clone()));
        match self.start(identity, &signature, endpoints).await {
            Ok(()) => Ok(SessionPhase::Ready),
            Err(e) => {
                warn!("session start failed: {}", e);
                if let Some(mut session) = self.session.take() {
                    session.abort_tasks();
                }
                self.set_phase(SessionPhase::Faulted);
                Err(e)
            }
        }
    }

    async fn start(&mut self, identity: &Identity, signature: &[u8], endpoints: &Endpoints) -> Result<()> {
        let local = identity
            .address
            .clone()
            .ok_or_else(|| RingchatError::SessionNotReady {
                phase: SessionPhase::AwaitingIdentity.to_string(),
            })?;

        self.set_phase(SessionPhase::Authenticating);
        let client = self
            .connector
            .connect(identity, signature, &endpoints.relay_url)
            .await?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER_SIZE);
        client.listen(inbound_tx).await?;

        let mut session = ActiveSession::new(Arc::clone(&client));
        session
            .tasks
            .push(tokio::spawn(forward_inbound(inbound_rx, local, self.store.clone())));
        // Held before bootstrapping so a failure still stops the listener
        self.session = Some(session);

        self.set_phase(SessionPhase::Bootstrapping);
        let joined = bootstrap(&client, &endpoints.bootstrap_urls).await?;
        info!(bootstrap = %joined, "joined overlay");

        let poller = tokio::spawn(poll_peers(
            client,
            self.store.clone(),
            self.names.clone(),
            self.poll_interval,
        ));
        if let Some(session) = self.session.as_mut() {
            session.tasks.push(poller);
        }

        self.set_phase(SessionPhase::Ready);
        Ok(())
    }

    fn ready(&self) -> Result<&ActiveSession> {
        match (self.phase(), self.session.as_ref()) {
            (SessionPhase::Ready, Some(session)) => Ok(session),
            (phase, _) => Err(RingchatError::SessionNotReady {
                phase: phase.to_string(),
            }),
        }
    }

    fn ready_mut(&mut self) -> Result<&mut ActiveSession> {
        let phase = self.phase();
        match (phase, self.session.as_mut()) {
            (SessionPhase::Ready, Some(session)) => Ok(session),
            _ => Err(RingchatError::SessionNotReady {
                phase: phase.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Ready Operations
    // ------------------------------------------------------------------------

    /// Ask the transport to dial a known address
    ///
    /// The peer is marked `Connecting` before the transport is called. If the
    /// transport rejects the dial, the store entries are put back the way they
    /// were.
    pub async fn connect_by_address(&self, peer: &Address, address_type: AddressType) -> Result<()> {
        let session = self.ready()?;

        let (previous, presence_status) = {
            let view = self.store.view();
            (
                view.transport_peer(peer).cloned(),
                view.presence_peer(peer).map(|p| p.status),
            )
        };

        self.store
            .dispatch(SessionEvent::ConnectRequested {
                peer: peer.clone(),
                address_type,
            })
            .await?;
        debug!(%peer, "connect requested");

        if let Err(e) = session.client.connect_with_address(peer, address_type).await {
            warn!(%peer, "connect failed: {}", e);
            let rollback = SessionEvent::ConnectFailed {
                peer: peer.clone(),
                previous,
                presence_status,
            };
            if let Err(reset) = self.store.dispatch(rollback).await {
                debug!(%peer, "connect rollback not applied: {}", reset);
            }
            return Err(RingchatError::PeerUnreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Create a local offer for out-of-band exchange
    pub async fn create_offer(&mut self) -> Result<Offer> {
        let session = self.ready_mut()?;
        let offer = session.client.create_offer().await?;
        session.pending_offers.insert(offer.transport_id.clone());
        debug!(transport_id = %offer.transport_id, "offer created");
        Ok(offer)
    }

    /// Answer a remote offer
    pub async fn answer_offer(&mut self, blob: &str) -> Result<Offer> {
        let session = self.ready_mut()?;
        let answer = session.client.answer_offer(blob).await?;
        session.pending_answers.insert(answer.transport_id.clone());
        debug!(transport_id = %answer.transport_id, "offer answered");
        Ok(answer)
    }

    /// Complete a handshake started by [`Self::create_offer`]
    pub async fn accept_answer(&mut self, transport_id: &TransportId, blob: &str) -> Result<()> {
        let session = self.ready_mut()?;

        if !session.pending_offers.remove(transport_id) {
            return Err(RingchatError::HandshakeMismatch {
                transport_id: transport_id.to_string(),
            });
        }

        if let Err(e) = session.client.accept_answer(transport_id, blob).await {
            session.pending_offers.insert(transport_id.clone());
            return Err(e);
        }
        Ok(())
    }

    /// Send a chat message
    ///
    /// Appending the message to the local chat is left to the caller.
    pub async fn send_message(&self, peer: &Address, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(RingchatError::EmptyMessage);
        }
        let session = self.ready()?;
        session.client.send_message(peer, text.as_bytes()).await
    }

    /// Disconnect every known transport peer
    ///
    /// Returns how many disconnects the transport accepted. Failures are
    /// logged and do not stop the remaining disconnects.
    pub async fn disconnect_all(&self) -> Result<usize> {
        let session = self.ready()?;
        let view = self.store.view();

        let mut disconnected = 0;
        for peer in view.transport_peers().values() {
            match session
                .client
                .disconnect(&peer.address, peer.address_type)
                .await
            {
                Ok(()) => disconnected += 1,
                Err(e) => warn!(peer = %peer.address, "disconnect failed: {}", e),
            }
        }
        Ok(disconnected)
    }

    /// Transport ids of offers awaiting an answer
    pub fn pending_offers(&self) -> Vec<TransportId> {
        self.session
            .as_ref()
            .map(|s| s.pending_offers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transport ids of answered offers not yet seen connected
    pub fn pending_answers(&mut self) -> Vec<TransportId> {
        let view = self.store.view();
        let connected: HashSet<&TransportId> = view
            .transport_peers()
            .values()
            .filter(|p| p.state == TransportState::Connected)
            .filter_map(|p| p.transport_id.as_ref())
            .collect();

        match self.session.as_mut() {
            Some(session) => {
                session.pending_answers.retain(|id| !connected.contains(id));
                session.pending_answers.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Stop background tasks and drop the overlay client
    pub async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.abort_tasks();
            if let Err(e) = self.store.dispatch(SessionEvent::SessionReset).await {
                debug!("session reset not applied: {}", e);
            }
        }
        self.set_phase(SessionPhase::TornDown);
    }
}

impl Drop for ConnectionOrchestrator {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.abort_tasks();
        }
    }
}

// ----------------------------------------------------------------------------
// Background Tasks
// ----------------------------------------------------------------------------

/// Race every bootstrap URL; the first success wins and the rest are ignored
async fn bootstrap(client: &Arc<dyn OverlayClient>, urls: &[String]) -> Result<String> {
    let (result_tx, mut result_rx) = mpsc::channel(urls.len().max(1));

    for url in urls {
        let client = Arc::clone(client);
        let result_tx = result_tx.clone();
        let url = url.clone();
        tokio::spawn(async move {
            let result = client.connect_peer_via_http(&url).await;
            let _ = result_tx.send((url, result)).await;
        });
    }
    drop(result_tx);

    let mut last_error = None;
    while let Some((url, result)) = result_rx.recv().await {
        match result {
            Ok(()) => return Ok(url),
            Err(e) => {
                warn!(bootstrap = %url, "bootstrap attempt failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| RingchatError::transport("no bootstrap endpoints configured")))
}

async fn forward_inbound(
    mut inbound: mpsc::Receiver<InboundMessage>,
    local: Address,
    store: StoreHandle,
) {
    while let Some(message) = inbound.recv().await {
        let from = match Address::parse(&message.from) {
            Ok(from) => from,
            Err(e) => {
                debug!("dropping inbound message: {}", e);
                continue;
            }
        };

        let text = String::from_utf8_lossy(&message.payload).into_owned();
        let event = SessionEvent::MessageReceived {
            peer: from.clone(),
            message: ChatMessage {
                from,
                to: local.clone(),
                text,
            },
        };
        if store.dispatch(event).await.is_err() {
            return;
        }
    }
}

/// List peers on a fixed interval
///
/// A listing that has not answered by the next tick is abandoned so one stuck
/// request cannot stall later polls.
async fn poll_peers(
    client: Arc<dyn OverlayClient>,
    store: StoreHandle,
    names: Option<NameResolver>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match tokio::time::timeout(interval, client.list_peers()).await {
            Ok(Ok(listings)) => {
                if store.dispatch(SessionEvent::PeersSnapshot(listings)).await.is_err() {
                    return;
                }
                if let Some(names) = &names {
                    names.request();
                }
            }
            Ok(Err(e)) => debug!("peer listing failed: {}", e),
            Err(_) => debug!(?interval, "peer listing timed out"),
        }
    }
}
