//! Wallet selection and signing
//!
//! At most one wallet is authoritative at a time. When several report a
//! connection simultaneously the first chain in [`ChainPriority`] wins.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::challenge::{SignatureScheme, UnsignedChallenge, WalletSignature};
use super::Identity;
use crate::errors::{Result, RingchatError};
use crate::types::{Address, Chain};

// ----------------------------------------------------------------------------
// Wallet Adapter
// ----------------------------------------------------------------------------

/// Boundary to a wallet provider SDK
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Chain this adapter signs for
    fn chain(&self) -> Chain;

    /// Whether the wallet currently reports a connected account
    fn is_connected(&self) -> bool;

    /// Accounts exposed by the wallet, preferred account first
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Sign an arbitrary message
    async fn sign_message(&self, message: &[u8]) -> Result<WalletSignature>;
}

// ----------------------------------------------------------------------------
// Chain Priority
// ----------------------------------------------------------------------------

/// Order in which simultaneously connected wallets are considered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPriority(Vec<Chain>);

impl Default for ChainPriority {
    fn default() -> Self {
        Self(vec![Chain::Ethereum, Chain::Solana, Chain::Bitcoin])
    }
}

impl ChainPriority {
    pub fn new(chains: Vec<Chain>) -> Result<Self> {
        if chains.is_empty() {
            return Err(RingchatError::InvalidConfiguration(
                "chain priority must name at least one chain".to_string(),
            ));
        }
        for (i, chain) in chains.iter().enumerate() {
            if *chain == Chain::None {
                return Err(RingchatError::InvalidConfiguration(
                    "chain priority cannot contain `none`".to_string(),
                ));
            }
            if chains[..i].contains(chain) {
                return Err(RingchatError::InvalidConfiguration(format!(
                    "chain {} listed twice in priority",
                    chain
                )));
            }
        }
        Ok(Self(chains))
    }

    pub fn chains(&self) -> &[Chain] {
        &self.0
    }

    fn rank(&self, chain: Chain) -> Option<usize> {
        self.0.iter().position(|c| *c == chain)
    }
}

// ----------------------------------------------------------------------------
// Identity Resolver
// ----------------------------------------------------------------------------

/// Produces the canonical [`Identity`] from the connected wallets
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    priority: ChainPriority,
}

impl IdentityResolver {
    pub fn new(priority: ChainPriority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &ChainPriority {
        &self.priority
    }

    /// Pick the authoritative wallet among the connected ones
    pub fn select<'a>(&self, adapters: &[&'a dyn WalletAdapter]) -> Option<&'a dyn WalletAdapter> {
        adapters
            .iter()
            .copied()
            .filter(|adapter| adapter.is_connected())
            .filter_map(|adapter| self.priority.rank(adapter.chain()).map(|rank| (rank, adapter)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, adapter)| adapter)
    }

    /// Authenticate against one wallet, surfacing the failure to the caller
    pub async fn authenticate(&self, adapter: &dyn WalletAdapter) -> Result<Identity> {
        let (_, challenge) = self.challenge_for(adapter).await?;
        self.sign(adapter, challenge).await
    }

    /// Resolve the identity for the current wallet set
    ///
    /// Never fails: a wallet that does not sign yields an identity without a
    /// signature, and no connected wallet yields [`Identity::empty`]. The
    /// wallet is asked for its accounts once.
    pub async fn resolve(&self, adapters: &[&dyn WalletAdapter]) -> Identity {
        let Some(adapter) = self.select(adapters) else {
            return Identity::empty();
        };

        let (address, challenge) = match self.challenge_for(adapter).await {
            Ok(found) => found,
            Err(e) => {
                warn!(chain = %adapter.chain(), "wallet account lookup failed: {}", e);
                return Identity {
                    auth_error: Some(e.to_string()),
                    ..Identity::empty()
                };
            }
        };

        let address_type = challenge.address_type;
        match self.sign(adapter, challenge).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(chain = %adapter.chain(), "wallet authentication failed: {}", e);
                Identity::unauthenticated(address, address_type, e.to_string())
            }
        }
    }

    async fn sign(&self, adapter: &dyn WalletAdapter, challenge: UnsignedChallenge) -> Result<Identity> {
        let chain = adapter.chain();

        debug!(%chain, address = %challenge.address, "requesting auth signature");
        let raw = adapter
            .sign_message(challenge.as_bytes())
            .await
            .map_err(|e| RingchatError::AuthenticationFailed {
                chain,
                reason: e.to_string(),
            })?;

        let signature = SignatureScheme::for_chain(chain)
            .decode(&raw)
            .map_err(|e| RingchatError::AuthenticationFailed {
                chain,
                reason: e.to_string(),
            })?;

        info!(%chain, address = %challenge.address, "wallet identity authenticated");
        Ok(Identity::signed(chain, challenge, signature))
    }

    async fn challenge_for(&self, adapter: &dyn WalletAdapter) -> Result<(Address, UnsignedChallenge)> {
        let chain = adapter.chain();
        let accounts = adapter
            .request_accounts()
            .await
            .map_err(|e| RingchatError::AuthenticationFailed {
                chain,
                reason: e.to_string(),
            })?;

        let raw = accounts
            .into_iter()
            .next()
            .ok_or_else(|| RingchatError::AuthenticationFailed {
                chain,
                reason: "wallet returned no accounts".to_string(),
            })?;

        let address = Address::parse(&raw)?;
        let challenge = UnsignedChallenge::new(address.clone(), chain.address_type());
        Ok((address, challenge))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
