//! Integration tests for the connection orchestrator
//!
//! Runs the orchestrator against an in-memory overlay client so the session
//! lifecycle, handshake bookkeeping and background tasks can be checked
//! deterministically.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ringchat_core::identity::UnsignedChallenge;
use ringchat_core::{
    Address, AddressType, Chain, Identity, PeerListing, ReadStatus, Result, RingchatError,
    SessionEvent, TransportId, TransportState,
};
use ringchat_runtime::{
    ConnectionOrchestrator, Endpoints, InboundMessage, Offer, OverlayClient, OverlayConnector,
    SessionPhase, SessionView, StoreHandle,
};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const LOCAL: &str = "0x1111111111111111111111111111111111111111";
const PEER_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const PEER_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

#[derive(Default)]
struct MockOverlay {
    failing_bootstraps: HashSet<String>,
    unreachable: HashSet<String>,
    failing_disconnects: HashSet<String>,
    peers: Mutex<Vec<PeerListing>>,
    offers_created: AtomicUsize,
    answers_created: AtomicUsize,
    accepted: Mutex<Vec<TransportId>>,
    sent: Mutex<Vec<(Address, Vec<u8>)>>,
    disconnected: Mutex<Vec<Address>>,
    inbound: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    /// First peer listing never answers
    stall_first_listing: bool,
    listings: AtomicUsize,
    /// Store to inspect when a dial reaches the transport
    dial_observer: Mutex<Option<StoreHandle>>,
    states_at_dial: Mutex<Vec<Option<TransportState>>>,
}

impl MockOverlay {
    fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound
            .lock()
            .unwrap()
            .clone()
            .expect("listener registered")
    }
}

#[async_trait]
impl OverlayClient for MockOverlay {
    async fn list_peers(&self) -> Result<Vec<PeerListing>> {
        let n = self.listings.fetch_add(1, Ordering::SeqCst);
        if self.stall_first_listing && n == 0 {
            std::future::pending::<()>().await;
        }
        Ok(self.peers.lock().unwrap().clone())
    }

    async fn connect_with_address(&self, address: &Address, _address_type: AddressType) -> Result<()> {
        let observer = self.dial_observer.lock().unwrap().clone();
        if let Some(store) = observer {
            let state = store.view().transport_peer(address).map(|p| p.state);
            self.states_at_dial.lock().unwrap().push(state);
        }
        if self.unreachable.contains(address.as_str()) {
            return Err(RingchatError::transport("no route to peer"));
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<Offer> {
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Offer {
            transport_id: TransportId::new(format!("t{}", n)),
            blob: format!("offer-{}", n),
        })
    }

    async fn answer_offer(&self, blob: &str) -> Result<Offer> {
        let n = self.answers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Offer {
            transport_id: TransportId::new(format!("a{}", n)),
            blob: format!("answer-to-{}", blob),
        })
    }

    async fn accept_answer(&self, transport_id: &TransportId, _blob: &str) -> Result<()> {
        self.accepted.lock().unwrap().push(transport_id.clone());
        Ok(())
    }

    async fn send_message(&self, address: &Address, payload: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((address.clone(), payload.to_vec()));
        Ok(())
    }

    async fn disconnect(&self, address: &Address, _address_type: AddressType) -> Result<()> {
        if self.failing_disconnects.contains(address.as_str()) {
            return Err(RingchatError::transport("peer already gone"));
        }
        self.disconnected.lock().unwrap().push(address.clone());
        Ok(())
    }

    async fn listen(&self, sink: mpsc::Sender<InboundMessage>) -> Result<()> {
        *self.inbound.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn connect_peer_via_http(&self, url: &str) -> Result<()> {
        if self.failing_bootstraps.contains(url) {
            return Err(RingchatError::transport(format!("{} refused", url)));
        }
        Ok(())
    }
}

struct MockConnector {
    client: Arc<MockOverlay>,
    connects: AtomicUsize,
}

impl MockConnector {
    fn new(client: MockOverlay) -> Arc<Self> {
        Arc::new(Self {
            client: Arc::new(client),
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OverlayConnector for MockConnector {
    async fn connect(
        &self,
        _identity: &Identity,
        signature: &[u8],
        _relay_url: &str,
    ) -> Result<Arc<dyn OverlayClient>> {
        assert!(!signature.is_empty());
        self.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn OverlayClient> = self.client.clone();
        Ok(client)
    }
}

fn addr(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

fn signed_identity() -> Identity {
    let challenge = UnsignedChallenge::new(addr(LOCAL), AddressType::Default);
    Identity::signed(Chain::Ethereum, challenge, vec![7; 65])
}

fn endpoints(bootstrap: &str) -> Endpoints {
    Endpoints::parse("turn://relay.example:3478", bootstrap)
}

fn listing(raw: &str, transport_id: &str, state: TransportState) -> PeerListing {
    PeerListing {
        address: addr(raw),
        address_type: AddressType::Default,
        transport_id: TransportId::new(transport_id),
        state,
    }
}

fn orchestrator(connector: &Arc<MockConnector>) -> (ConnectionOrchestrator, StoreHandle) {
    orchestrator_polling_every(connector, Duration::from_millis(20))
}

fn orchestrator_polling_every(
    connector: &Arc<MockConnector>,
    poll_interval: Duration,
) -> (ConnectionOrchestrator, StoreHandle) {
    let (store, _task) = StoreHandle::spawn();
    let orchestrator = ConnectionOrchestrator::new(connector.clone(), store.clone(), poll_interval);
    (orchestrator, store)
}

async fn ready_orchestrator(overlay: MockOverlay) -> (ConnectionOrchestrator, StoreHandle, Arc<MockConnector>) {
    let connector = MockConnector::new(overlay);
    let (mut orchestrator, store) = orchestrator(&connector);
    let phase = orchestrator
        .sync(&signed_identity(), &endpoints("http://a"))
        .await
        .unwrap();
    assert_eq!(phase, SessionPhase::Ready);
    (orchestrator, store, connector)
}

async fn wait_for(updates: &mut watch::Receiver<SessionView>, check: impl Fn(&SessionView) -> bool) {
    timeout(Duration::from_secs(2), async {
        loop {
            if check(&updates.borrow_and_update()) {
                return;
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .expect("store condition reached within timeout");
}

// ----------------------------------------------------------------------------
// Lifecycle Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unsigned_identity_waits_without_transport() {
    let connector = MockConnector::new(MockOverlay::default());
    let (mut orchestrator, _store) = orchestrator(&connector);
    assert_eq!(orchestrator.phase(), SessionPhase::Uninitialized);

    let unsigned = Identity::unauthenticated(addr(LOCAL), AddressType::Default, "rejected".into());
    for _ in 0..3 {
        let phase = orchestrator.sync(&unsigned, &endpoints("http://a")).await.unwrap();
        assert_eq!(phase, SessionPhase::AwaitingIdentity);
    }

    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    assert!(matches!(
        orchestrator.create_offer().await,
        Err(RingchatError::SessionNotReady { .. })
    ));
}

#[tokio::test]
async fn test_missing_endpoints_wait() {
    let connector = MockConnector::new(MockOverlay::default());
    let (mut orchestrator, _store) = orchestrator(&connector);

    let phase = orchestrator
        .sync(&signed_identity(), &Endpoints::parse("turn://relay", ""))
        .await
        .unwrap();
    assert_eq!(phase, SessionPhase::AwaitingIdentity);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bootstrap_race_first_success_wins() {
    let overlay = MockOverlay {
        failing_bootstraps: HashSet::from(["http://a".to_string()]),
        ..MockOverlay::default()
    };
    let connector = MockConnector::new(overlay);
    let (mut orchestrator, _store) = orchestrator(&connector);
    let mut phases = orchestrator.phase_watch();

    let phase = orchestrator
        .sync(&signed_identity(), &endpoints("http://a;http://b"))
        .await
        .unwrap();

    assert_eq!(phase, SessionPhase::Ready);
    assert!(phases.has_changed().unwrap());
    assert_eq!(*phases.borrow_and_update(), SessionPhase::Ready);
}

#[tokio::test]
async fn test_all_bootstraps_failing_faults_session() {
    let overlay = MockOverlay {
        failing_bootstraps: HashSet::from(["http://a".to_string(), "http://b".to_string()]),
        ..MockOverlay::default()
    };
    let connector = MockConnector::new(overlay);
    let (mut orchestrator, _store) = orchestrator(&connector);

    let result = orchestrator
        .sync(&signed_identity(), &endpoints("http://a;http://b"))
        .await;
    assert!(result.is_err());
    assert_eq!(orchestrator.phase(), SessionPhase::Faulted);

    let err = orchestrator.send_message(&addr(PEER_B), "hello").await.unwrap_err();
    match err {
        RingchatError::SessionNotReady { phase } => assert_eq!(phase, "faulted"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(matches!(
        orchestrator.disconnect_all().await,
        Err(RingchatError::SessionNotReady { .. })
    ));
}

#[tokio::test]
async fn test_unchanged_inputs_keep_session() {
    let (mut orchestrator, _store, connector) = ready_orchestrator(MockOverlay::default()).await;

    orchestrator
        .sync(&signed_identity(), &endpoints("http://a"))
        .await
        .unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    // New bootstrap list forces a fresh session
    orchestrator
        .sync(&signed_identity(), &endpoints("http://a;http://c"))
        .await
        .unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.phase(), SessionPhase::Ready);
}

#[tokio::test]
async fn test_display_name_change_keeps_session() {
    let (mut orchestrator, _store, connector) = ready_orchestrator(MockOverlay::default()).await;

    let renamed = signed_identity().with_display_name("alice.eth");
    let phase = orchestrator.sync(&renamed, &endpoints("http://a")).await.unwrap();

    assert_eq!(phase, SessionPhase::Ready);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wallet_disconnect_tears_down() {
    let (mut orchestrator, _store, _connector) = ready_orchestrator(MockOverlay::default()).await;

    let phase = orchestrator
        .sync(&Identity::empty(), &endpoints("http://a"))
        .await
        .unwrap();
    assert_eq!(phase, SessionPhase::AwaitingIdentity);
    assert!(orchestrator.pending_offers().is_empty());
}

// ----------------------------------------------------------------------------
// Ready Operation Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_offer_answer_handshake() {
    let (mut orchestrator, _store, connector) = ready_orchestrator(MockOverlay::default()).await;

    let offer = orchestrator.create_offer().await.unwrap();
    assert_eq!(offer.transport_id, TransportId::new("t1"));
    assert_eq!(orchestrator.pending_offers(), vec![TransportId::new("t1")]);

    orchestrator
        .accept_answer(&TransportId::new("t1"), "answer-blob")
        .await
        .unwrap();

    let err = orchestrator
        .accept_answer(&TransportId::new("t2"), "answer-blob")
        .await
        .unwrap_err();
    assert!(matches!(err, RingchatError::HandshakeMismatch { .. }));

    // The pending offer is consumed by the first accept
    assert!(orchestrator
        .accept_answer(&TransportId::new("t1"), "answer-blob")
        .await
        .is_err());
    assert_eq!(*connector.client.accepted.lock().unwrap(), vec![TransportId::new("t1")]);
}

#[tokio::test]
async fn test_answered_offer_pending_until_connected() {
    let (mut orchestrator, store, connector) = ready_orchestrator(MockOverlay::default()).await;

    let answer = orchestrator.answer_offer("remote-offer").await.unwrap();
    assert_eq!(answer.blob, "answer-to-remote-offer");
    assert_eq!(orchestrator.pending_answers(), vec![answer.transport_id.clone()]);

    connector.client.peers.lock().unwrap().push(listing(
        PEER_B,
        answer.transport_id.as_str(),
        TransportState::Connected,
    ));
    let mut updates = store.subscribe();
    wait_for(&mut updates, |view| {
        view.transport_peer(&addr(PEER_B))
            .is_some_and(|p| p.state == TransportState::Connected)
    })
    .await;

    assert!(orchestrator.pending_answers().is_empty());
}

#[tokio::test]
async fn test_connect_by_address() {
    let overlay = MockOverlay {
        unreachable: HashSet::from([PEER_C.to_string()]),
        ..MockOverlay::default()
    };
    let (orchestrator, store, _connector) = ready_orchestrator(overlay).await;

    orchestrator
        .connect_by_address(&addr(PEER_B), AddressType::Default)
        .await
        .unwrap();
    let peer = store.view().transport_peer(&addr(PEER_B)).cloned().unwrap();
    assert_eq!(peer.state, TransportState::Connecting);

    let err = orchestrator
        .connect_by_address(&addr(PEER_C), AddressType::Default)
        .await
        .unwrap_err();
    assert!(matches!(err, RingchatError::PeerUnreachable { .. }));
    assert!(store.view().transport_peer(&addr(PEER_C)).is_none());
}

/// Ready orchestrator that polls once at start and then stays out of the way
async fn quiet_orchestrator(overlay: MockOverlay) -> (ConnectionOrchestrator, StoreHandle, Arc<MockConnector>) {
    let connector = MockConnector::new(overlay);
    let (mut orchestrator, store) = orchestrator_polling_every(&connector, Duration::from_secs(3600));
    orchestrator
        .sync(&signed_identity(), &endpoints("http://a"))
        .await
        .unwrap();
    *connector.client.dial_observer.lock().unwrap() = Some(store.clone());
    (orchestrator, store, connector)
}

async fn drop_peer(store: &StoreHandle, raw: &str) {
    store
        .dispatch(SessionEvent::PeersSnapshot(vec![listing(raw, "t-old", TransportState::Connected)]))
        .await
        .unwrap();
    store.dispatch(SessionEvent::PeersSnapshot(vec![])).await.unwrap();
}

#[tokio::test]
async fn test_redial_marks_connecting_before_transport() {
    let (orchestrator, store, connector) = quiet_orchestrator(MockOverlay::default()).await;
    drop_peer(&store, PEER_B).await;
    assert_eq!(
        store.view().transport_peer(&addr(PEER_B)).unwrap().state,
        TransportState::Disconnected
    );

    orchestrator
        .connect_by_address(&addr(PEER_B), AddressType::Default)
        .await
        .unwrap();

    assert_eq!(
        *connector.client.states_at_dial.lock().unwrap(),
        vec![Some(TransportState::Connecting)]
    );

    store
        .dispatch(SessionEvent::PeersSnapshot(vec![listing(PEER_B, "t-new", TransportState::Connected)]))
        .await
        .unwrap();
    assert_eq!(
        store.view().transport_peer(&addr(PEER_B)).unwrap().state,
        TransportState::Connected
    );
}

#[tokio::test]
async fn test_failed_redial_restores_previous_peer() {
    let overlay = MockOverlay {
        unreachable: HashSet::from([PEER_C.to_string()]),
        ..MockOverlay::default()
    };
    let (orchestrator, store, connector) = quiet_orchestrator(overlay).await;
    drop_peer(&store, PEER_C).await;
    let before = store.view().transport_peer(&addr(PEER_C)).cloned();

    let err = orchestrator
        .connect_by_address(&addr(PEER_C), AddressType::Default)
        .await
        .unwrap_err();

    assert!(matches!(err, RingchatError::PeerUnreachable { .. }));
    assert_eq!(
        *connector.client.states_at_dial.lock().unwrap(),
        vec![Some(TransportState::Connecting)]
    );
    assert_eq!(store.view().transport_peer(&addr(PEER_C)).cloned(), before);
}

#[tokio::test]
async fn test_send_message() {
    let (orchestrator, _store, connector) = ready_orchestrator(MockOverlay::default()).await;

    assert!(matches!(
        orchestrator.send_message(&addr(PEER_B), "   ").await,
        Err(RingchatError::EmptyMessage)
    ));
    assert!(connector.client.sent.lock().unwrap().is_empty());

    orchestrator.send_message(&addr(PEER_B), "gm").await.unwrap();
    assert_eq!(
        *connector.client.sent.lock().unwrap(),
        vec![(addr(PEER_B), b"gm".to_vec())]
    );
}

#[tokio::test]
async fn test_disconnect_all_continues_after_failure() {
    let overlay = MockOverlay {
        failing_disconnects: HashSet::from([PEER_B.to_string()]),
        ..MockOverlay::default()
    };
    let (orchestrator, store, connector) = ready_orchestrator(overlay).await;
    store
        .dispatch(SessionEvent::PeersSnapshot(vec![
            listing(PEER_B, "t-b", TransportState::Connected),
            listing(PEER_C, "t-c", TransportState::Connected),
        ]))
        .await
        .unwrap();

    let disconnected = orchestrator.disconnect_all().await.unwrap();
    assert_eq!(disconnected, 1);
    assert_eq!(*connector.client.disconnected.lock().unwrap(), vec![addr(PEER_C)]);
}

// ----------------------------------------------------------------------------
// Background Task Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_inbound_message_reaches_store() {
    let (_orchestrator, store, connector) = ready_orchestrator(MockOverlay::default()).await;
    let mut updates = store.subscribe();

    connector
        .client
        .inbound_sender()
        .send(InboundMessage {
            from: PEER_B.to_uppercase().replace("0X", "0x"),
            payload: b"hello there".to_vec(),
        })
        .await
        .unwrap();

    wait_for(&mut updates, |view| view.chat(&addr(PEER_B)).is_some()).await;
    let view = store.view();
    let chat = view.chat(&addr(PEER_B)).unwrap();
    assert_eq!(chat.messages[0].text, "hello there");
    assert_eq!(chat.messages[0].to, addr(LOCAL));
    assert_eq!(chat.read_status, ReadStatus::Unread);
}

#[tokio::test]
async fn test_poller_marks_dropped_peers() {
    let overlay = MockOverlay::default();
    overlay
        .peers
        .lock()
        .unwrap()
        .push(listing(PEER_B, "t-b", TransportState::Connected));
    let (_orchestrator, store, connector) = ready_orchestrator(overlay).await;
    let mut updates = store.subscribe();

    wait_for(&mut updates, |view| view.transport_peer(&addr(PEER_B)).is_some()).await;

    connector.client.peers.lock().unwrap().clear();
    wait_for(&mut updates, |view| {
        view.transport_peer(&addr(PEER_B))
            .is_some_and(|p| p.state == TransportState::Disconnected)
    })
    .await;
}

#[tokio::test]
async fn test_stalled_listing_does_not_stop_polling() {
    let overlay = MockOverlay {
        stall_first_listing: true,
        ..MockOverlay::default()
    };
    overlay
        .peers
        .lock()
        .unwrap()
        .push(listing(PEER_B, "t-b", TransportState::Connected));
    let (_orchestrator, store, connector) = ready_orchestrator(overlay).await;
    let mut updates = store.subscribe();

    wait_for(&mut updates, |view| view.transport_peer(&addr(PEER_B)).is_some()).await;
    assert!(connector.client.listings.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_teardown_resets_session() {
    let overlay = MockOverlay::default();
    overlay
        .peers
        .lock()
        .unwrap()
        .push(listing(PEER_B, "t-b", TransportState::Connected));
    let (mut orchestrator, store, _connector) = ready_orchestrator(overlay).await;
    let mut updates = store.subscribe();
    wait_for(&mut updates, |view| view.transport_peer(&addr(PEER_B)).is_some()).await;

    orchestrator.create_offer().await.unwrap();
    orchestrator.teardown().await;

    assert_eq!(orchestrator.phase(), SessionPhase::TornDown);
    assert!(orchestrator.pending_offers().is_empty());
    assert_eq!(
        store.view().transport_peer(&addr(PEER_B)).unwrap().state,
        TransportState::Disconnected
    );

    // Poller is stopped: the state stays disconnected
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(
        store.view().transport_peer(&addr(PEER_B)).unwrap().state,
        TransportState::Disconnected
    );
    assert!(matches!(
        orchestrator.create_offer().await,
        Err(RingchatError::SessionNotReady { .. })
    ));
}
