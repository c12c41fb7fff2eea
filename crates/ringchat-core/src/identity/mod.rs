//! Wallet-backed identity
//!
//! Turns whichever wallet is connected into one canonical [`Identity`] that the
//! presence channel and the connection orchestrator are constructed with.

pub mod challenge;
pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::types::{Address, AddressType, Chain};

pub use challenge::{SignatureScheme, UnsignedChallenge, WalletSignature};
pub use resolver::{ChainPriority, IdentityResolver, WalletAdapter};

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// The local user's identity as seen by every downstream component
///
/// A `None` signature means "not yet authenticated"; it is not an error state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: Option<Address>,
    pub display_name: String,
    pub chain: Chain,
    pub address_type: AddressType,
    pub challenge: Option<UnsignedChallenge>,
    pub signature: Option<Vec<u8>>,
    /// Reason the last signing attempt failed, for display next to the connect button
    pub auth_error: Option<String>,
}

impl Identity {
    /// Identity of a user with no wallet connected
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fully signed identity
    pub fn signed(
        chain: Chain,
        challenge: UnsignedChallenge,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            display_name: challenge.address.short(),
            address: Some(challenge.address.clone()),
            chain,
            address_type: challenge.address_type,
            challenge: Some(challenge),
            signature: Some(signature),
            auth_error: None,
        }
    }

    /// Identity whose wallet refused or failed to sign
    pub fn unauthenticated(address: Address, address_type: AddressType, reason: String) -> Self {
        Self {
            display_name: address.short(),
            address: Some(address),
            chain: Chain::None,
            address_type,
            challenge: None,
            signature: None,
            auth_error: Some(reason),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.address.is_some() && self.signature.is_some() && self.challenge.is_some()
    }

    pub fn has_address(&self) -> bool {
        self.address.is_some()
    }

    /// Whether both identities would authenticate to the overlay the same way
    ///
    /// Ignores `display_name` and `auth_error`.
    pub fn same_credentials(&self, other: &Identity) -> bool {
        self.address == other.address
            && self.address_type == other.address_type
            && self.chain == other.chain
            && self.challenge == other.challenge
            && self.signature == other.signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed() -> Identity {
        let address = Address::parse("0xAbC0000000000000000000000000000000000001").unwrap();
        let challenge = UnsignedChallenge::new(address, AddressType::Default);
        Identity::signed(Chain::Ethereum, challenge, vec![1; 65])
    }

    #[test]
    fn test_display_name_does_not_change_credentials() {
        let identity = signed();
        let renamed = identity.clone().with_display_name("alice.eth");

        assert_ne!(identity, renamed);
        assert!(identity.same_credentials(&renamed));
    }

    #[test]
    fn test_new_signature_changes_credentials() {
        let identity = signed();
        let mut resigned = identity.clone();
        resigned.signature = Some(vec![2; 65]);

        assert!(!identity.same_credentials(&resigned));
        assert!(!identity.same_credentials(&Identity::empty()));
    }
}
