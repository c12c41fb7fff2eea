//! Auth challenge construction and wallet signature decoding

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{Result, RingchatError};
use crate::types::{Address, AddressType, Chain};

const CHALLENGE_DOMAIN: &str = "ringchat-auth";

const ECDSA_SIGNATURE_LEN: usize = 65;
const ED25519_SIGNATURE_LEN: usize = 64;
const BIP137_SIGNATURE_LEN: usize = 65;

// ----------------------------------------------------------------------------
// Unsigned Challenge
// ----------------------------------------------------------------------------

/// Text a wallet signs to prove control of an address
///
/// Derived only from the canonical address and its type, so the same wallet
/// always produces the same challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedChallenge {
    pub address: Address,
    pub address_type: AddressType,
    pub auth: String,
}

impl UnsignedChallenge {
    pub fn new(address: Address, address_type: AddressType) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(address_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(address.as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());

        let auth = format!(
            "{}\ntype:{}\naddress:{}\ndigest:{}",
            CHALLENGE_DOMAIN, address_type, address, digest
        );

        Self {
            address,
            address_type,
            auth,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.auth.as_bytes()
    }
}

// ----------------------------------------------------------------------------
// Signature Decoding
// ----------------------------------------------------------------------------

/// Raw value handed back by a wallet's sign call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletSignature {
    /// Encoded signature string (hex for EVM wallets, base64 for BIP-137)
    Text(String),
    /// Raw signature bytes
    Bytes(Vec<u8>),
}

/// Encoding a wallet family uses for its signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `0x`-prefixed hex of a 65 byte recoverable ECDSA signature
    HexEcdsa,
    /// 64 raw ed25519 signature bytes
    Ed25519Raw,
    /// Base64 of a 65 byte Bitcoin signed-message signature
    Bip137Base64,
}

impl SignatureScheme {
    pub fn for_chain(chain: Chain) -> Self {
        match chain {
            Chain::Ethereum | Chain::None => SignatureScheme::HexEcdsa,
            Chain::Solana => SignatureScheme::Ed25519Raw,
            Chain::Bitcoin => SignatureScheme::Bip137Base64,
        }
    }

    fn expected_len(&self) -> usize {
        match self {
            SignatureScheme::HexEcdsa => ECDSA_SIGNATURE_LEN,
            SignatureScheme::Ed25519Raw => ED25519_SIGNATURE_LEN,
            SignatureScheme::Bip137Base64 => BIP137_SIGNATURE_LEN,
        }
    }

    /// Decode a wallet signature into canonical bytes
    pub fn decode(&self, signature: &WalletSignature) -> Result<Vec<u8>> {
        let bytes = match (self, signature) {
            (_, WalletSignature::Bytes(bytes)) => bytes.clone(),
            (SignatureScheme::HexEcdsa, WalletSignature::Text(text)) => {
                let trimmed = text.trim();
                let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                hex::decode(hex_part)
                    .map_err(|e| RingchatError::InvalidSignature(format!("bad hex: {}", e)))?
            }
            (SignatureScheme::Bip137Base64, WalletSignature::Text(text)) => STANDARD
                .decode(text.trim())
                .map_err(|e| RingchatError::InvalidSignature(format!("bad base64: {}", e)))?,
            (SignatureScheme::Ed25519Raw, WalletSignature::Text(_)) => {
                return Err(RingchatError::InvalidSignature(
                    "ed25519 wallets must return raw signature bytes".to_string(),
                ));
            }
        };

        if bytes.len() != self.expected_len() {
            return Err(RingchatError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                self.expected_len(),
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}
