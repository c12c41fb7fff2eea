//! Name resolution
//!
//! Looks up human readable names for peers on every configured naming service
//! and pushes verified results into the store. Lookups are fire-and-forget and
//! never surface errors to callers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ringchat_core::{Address, NameSource, Result, RingchatError, SessionEvent};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::store_task::StoreHandle;

// ----------------------------------------------------------------------------
// Name Service
// ----------------------------------------------------------------------------

/// Client for one naming back-end (ENS, BNS)
#[async_trait]
pub trait NameService: Send + Sync {
    fn source(&self) -> NameSource;

    /// Reverse lookup: address to primary name
    async fn lookup_address(&self, address: &Address) -> Result<Option<String>>;

    /// Forward lookup: name to address
    async fn resolve_name(&self, name: &str) -> Result<Option<String>>;
}

// ----------------------------------------------------------------------------
// Name Resolver
// ----------------------------------------------------------------------------

type InFlight = Arc<Mutex<HashSet<(Address, NameSource)>>>;

/// Fans lookups out to every name service, at most one per peer and source
#[derive(Clone)]
pub struct NameResolver {
    services: Vec<Arc<dyn NameService>>,
    in_flight: InFlight,
    store: StoreHandle,
}

impl NameResolver {
    pub fn new(services: Vec<Arc<dyn NameService>>, store: StoreHandle) -> Self {
        Self {
            services,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            store,
        }
    }

    /// Start lookups for peers still missing names
    ///
    /// Only EVM addresses are looked up. Returns handles for the spawned
    /// lookups; callers normally drop them.
    pub fn request(&self) -> Vec<JoinHandle<()>> {
        let view = self.store.view();
        let mut spawned = Vec::new();

        for service in &self.services {
            let source = service.source();
            for address in view.peers_missing_name(source) {
                if !address.is_evm() {
                    continue;
                }
                if !self.claim(&address, source) {
                    continue;
                }
                spawned.push(tokio::spawn(lookup(
                    Arc::clone(service),
                    address,
                    self.store.clone(),
                    Arc::clone(&self.in_flight),
                )));
            }
        }

        spawned
    }

    /// Number of lookups currently outstanding
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn claim(&self, address: &Address, source: NameSource) -> bool {
        lock(&self.in_flight).insert((address.clone(), source))
    }
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashSet<(Address, NameSource)>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn lookup(
    service: Arc<dyn NameService>,
    address: Address,
    store: StoreHandle,
    in_flight: InFlight,
) {
    let source = service.source();

    match verified_name(service.as_ref(), &address).await {
        Ok(name) => {
            debug!(peer = %address, %source, %name, "name resolved");
            if let Err(e) = store
                .dispatch(SessionEvent::NameResolved {
                    peer: address.clone(),
                    source,
                    name,
                })
                .await
            {
                debug!(peer = %address, "dropping resolved name: {}", e);
            }
        }
        Err(e) => debug!(peer = %address, %source, "{}", e),
    }

    lock(&in_flight).remove(&(address, source));
}

/// Reverse lookup followed by a forward lookup that must land on the same address
async fn verified_name(service: &dyn NameService, address: &Address) -> Result<String> {
    let failed = |reason: String| RingchatError::NameResolutionFailed {
        address: address.to_string(),
        reason,
    };

    let name = service
        .lookup_address(address)
        .await
        .map_err(|e| failed(e.to_string()))?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| failed("no name registered".to_string()))?;

    let forward = service
        .resolve_name(&name)
        .await
        .map_err(|e| failed(e.to_string()))?
        .ok_or_else(|| failed(format!("{} does not resolve", name)))?;

    match Address::parse(&forward) {
        Ok(resolved) if resolved == *address => Ok(name),
        _ => Err(failed(format!("{} resolves to {}", name, forward))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ringchat_core::{AddressType, PeerListing, TransportId, TransportState};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockService {
        source: NameSource,
        reverse: HashMap<String, String>,
        forward: HashMap<String, String>,
        lookups: AtomicUsize,
    }

    impl MockService {
        fn new(source: NameSource) -> Self {
            Self {
                source,
                reverse: HashMap::new(),
                forward: HashMap::new(),
                lookups: AtomicUsize::new(0),
            }
        }

        fn with(mut self, address: &str, name: &str, resolves_to: &str) -> Self {
            self.reverse.insert(address.to_string(), name.to_string());
            self.forward.insert(name.to_string(), resolves_to.to_string());
            self
        }
    }

    #[async_trait]
    impl NameService for MockService {
        fn source(&self) -> NameSource {
            self.source
        }

        async fn lookup_address(&self, address: &Address) -> Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.reverse.get(address.as_str()).cloned())
        }

        async fn resolve_name(&self, name: &str) -> Result<Option<String>> {
            Ok(self.forward.get(name).cloned())
        }
    }

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    async fn store_with_peers(peers: &[&str]) -> StoreHandle {
        let (store, _task) = StoreHandle::spawn();
        let listings = peers
            .iter()
            .map(|raw| PeerListing {
                address: Address::parse(raw).unwrap(),
                address_type: AddressType::infer(&Address::parse(raw).unwrap()),
                transport_id: TransportId::new(*raw),
                state: TransportState::Connected,
            })
            .collect();
        store.dispatch(SessionEvent::PeersSnapshot(listings)).await.unwrap();
        store
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_round_trip_name_accepted() {
        let store = store_with_peers(&[ALICE]).await;
        // Forward record uses checksum casing
        let ens = MockService::new(NameSource::Ens).with(
            ALICE,
            "alice.eth",
            "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
        );
        let resolver = NameResolver::new(vec![Arc::new(ens)], store.clone());

        join_all(resolver.request()).await;

        let peer = Address::parse(ALICE).unwrap();
        assert_eq!(store.view().transport_peer(&peer).unwrap().ens, "alice.eth");
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_forged_name_rejected() {
        let store = store_with_peers(&[ALICE]).await;
        let bns = MockService::new(NameSource::Bns).with(ALICE, "mallory.bit", BOB);
        let resolver = NameResolver::new(vec![Arc::new(bns)], store.clone());

        join_all(resolver.request()).await;

        let peer = Address::parse(ALICE).unwrap();
        assert_eq!(store.view().transport_peer(&peer).unwrap().bns, "");
    }

    #[tokio::test]
    async fn test_only_missing_evm_peers_are_queried() {
        let store = store_with_peers(&[ALICE, BOB, "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"]).await;
        store
            .dispatch(SessionEvent::NameResolved {
                peer: Address::parse(BOB).unwrap(),
                source: NameSource::Ens,
                name: "bob.eth".to_string(),
            })
            .await
            .unwrap();

        let ens = Arc::new(MockService::new(NameSource::Ens));
        let resolver = NameResolver::new(vec![ens.clone()], store.clone());
        join_all(resolver.request()).await;

        assert_eq!(ens.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_duplicate_lookups_in_flight() {
        let store = store_with_peers(&[ALICE]).await;
        let resolver = NameResolver::new(
            vec![Arc::new(MockService::new(NameSource::Ens))],
            store.clone(),
        );

        assert!(resolver.claim(&Address::parse(ALICE).unwrap(), NameSource::Ens));
        assert!(resolver.request().is_empty());
        assert_eq!(resolver.in_flight(), 1);
    }
}
