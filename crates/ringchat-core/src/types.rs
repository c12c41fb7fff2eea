//! Core identifier types
//!
//! Every peer identifier entering the system is canonicalized into an
//! [`Address`] before it is used as a map key, so lookups never need
//! case-insensitive comparison.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RingchatError};

const LEGACY_BITCOIN_MIN_LEN: usize = 26;
const LEGACY_BITCOIN_MAX_LEN: usize = 35;

// ----------------------------------------------------------------------------
// Address
// ----------------------------------------------------------------------------

/// Canonical peer address
///
/// EVM addresses are stored lowercase with a `0x` prefix. Other encodings
/// (base58 ed25519 keys, bitcoin addresses) are case sensitive and kept as
/// given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Canonicalize a raw identifier
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RingchatError::InvalidAddress(raw.to_string()));
        }

        if let Some(rest) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            if rest.is_empty() {
                return Err(RingchatError::InvalidAddress(raw.to_string()));
            }
            return Ok(Self(format!("0x{}", rest.to_ascii_lowercase())));
        }

        // Transport listings drop the prefix from EVM addresses
        if trimmed.len() == 40 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Self(format!("0x{}", trimmed.to_ascii_lowercase())));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is an EVM style (`0x`) address
    pub fn is_evm(&self) -> bool {
        self.0.starts_with("0x")
    }

    /// Abbreviated form used when no name is known, e.g. `0x1234...abcd`
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = RingchatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = RingchatError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Address Type
// ----------------------------------------------------------------------------

/// Signature scheme tag carried alongside an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressType {
    #[default]
    #[serde(rename = "DEFAULT")]
    Default,
    #[serde(rename = "ED25519")]
    Ed25519,
    #[serde(rename = "BIP137")]
    Bip137,
}

impl AddressType {
    /// Wire name of the address type
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Default => "DEFAULT",
            AddressType::Ed25519 => "ED25519",
            AddressType::Bip137 => "BIP137",
        }
    }

    /// Guess the address type from the address encoding
    pub fn infer(address: &Address) -> Self {
        let raw = address.as_str();
        // Legacy and P2SH bitcoin addresses are at most 35 characters; longer
        // base58 strings are ed25519 keys
        let legacy_bitcoin = (raw.starts_with('1') || raw.starts_with('3'))
            && (LEGACY_BITCOIN_MIN_LEN..=LEGACY_BITCOIN_MAX_LEN).contains(&raw.len());

        if address.is_evm() {
            AddressType::Default
        } else if raw.starts_with("bc1") || raw.starts_with("tb1") || legacy_bitcoin {
            AddressType::Bip137
        } else {
            AddressType::Ed25519
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = RingchatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(AddressType::Default),
            "ED25519" => Ok(AddressType::Ed25519),
            "BIP137" => Ok(AddressType::Bip137),
            other => Err(RingchatError::InvalidConfiguration(format!(
                "unknown address type: {}",
                other
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// Chain
// ----------------------------------------------------------------------------

/// Wallet family an identity was obtained from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Solana,
    Bitcoin,
    #[default]
    None,
}

impl Chain {
    /// Address type used when authenticating with a wallet of this chain
    pub fn address_type(&self) -> AddressType {
        match self {
            Chain::Ethereum | Chain::None => AddressType::Default,
            Chain::Solana => AddressType::Ed25519,
            Chain::Bitcoin => AddressType::Bip137,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Ethereum => "ethereum",
            Chain::Solana => "solana",
            Chain::Bitcoin => "bitcoin",
            Chain::None => "none",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Transport Id
// ----------------------------------------------------------------------------

/// Identifier the overlay transport assigns to a (pending) link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(String);

impl TransportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransportId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
