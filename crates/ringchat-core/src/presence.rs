//! Presence roster model and wire codec
//!
//! The presence service speaks JSON over a websocket. Inbound frames are
//! normalized into [`PresenceUpdate`]s keyed by canonical address before they
//! reach the session store.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, RingchatError};
use crate::types::{Address, AddressType};

// ----------------------------------------------------------------------------
// Roster Model
// ----------------------------------------------------------------------------

/// Connection status the UI tracks for an online peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    #[serde(rename = "")]
    Idle,
    Connecting,
    Connected,
}

/// A peer currently announced as online
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePeer {
    pub address: Address,
    pub address_type: AddressType,
    pub status: PresenceStatus,
    pub name: String,
    pub ens: String,
    pub bns: String,
}

impl PresencePeer {
    pub fn new(address: Address, address_type: AddressType) -> Self {
        Self {
            name: address.short(),
            address,
            address_type,
            status: PresenceStatus::Idle,
            ens: String::new(),
            bns: String::new(),
        }
    }
}

/// Normalized inbound presence event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceUpdate {
    Joined(PresencePeer),
    Left(Address),
    /// Full roster, sent by the service on (re)connect
    Roster(Vec<PresencePeer>),
}

/// Announcement the local user sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Announcement {
    Join,
    Leave,
}

// ----------------------------------------------------------------------------
// Wire Format
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DidFrame {
    id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    address_type: Option<AddressType>,
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    did: DidFrame,
    timestamp: u64,
    data: &'a Announcement,
}

/// Encode an announcement for the presence service
pub fn encode_announcement(
    address: &Address,
    address_type: AddressType,
    announcement: Announcement,
) -> Result<String> {
    let frame = OutboundFrame {
        did: DidFrame {
            id: address.to_string(),
            address_type: Some(address_type),
        },
        timestamp: now_millis(),
        data: &announcement,
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Decode an inbound presence frame
pub fn decode_update(frame: &str) -> Result<PresenceUpdate> {
    let value: Value = serde_json::from_str(frame)?;
    let data = value
        .get("data")
        .ok_or_else(|| malformed("frame without `data`"))?;

    match data {
        Value::String(kind) => {
            let did = value.get("did").ok_or_else(|| malformed("event without `did`"))?;
            let (address, address_type) = parse_did(did)?;
            match kind.as_str() {
                "join" => Ok(PresenceUpdate::Joined(PresencePeer::new(address, address_type))),
                "leave" => Ok(PresenceUpdate::Left(address)),
                other => Err(malformed(&format!("unknown event `{}`", other))),
            }
        }
        Value::Object(map) => {
            let list = map
                .get("list")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("snapshot without `list`"))?;
            let peers = list
                .iter()
                .map(|entry| parse_did(entry).map(|(a, t)| PresencePeer::new(a, t)))
                .collect::<Result<Vec<_>>>()?;
            Ok(PresenceUpdate::Roster(peers))
        }
        _ => Err(malformed("unsupported `data` payload")),
    }
}

fn parse_did(did: &Value) -> Result<(Address, AddressType)> {
    match did {
        // Older presence servers send a bare id
        Value::String(id) => {
            let address = Address::parse(id)?;
            let address_type = AddressType::infer(&address);
            Ok((address, address_type))
        }
        Value::Object(_) => {
            let frame: DidFrame = serde_json::from_value(did.clone())?;
            let address = Address::parse(&frame.id)?;
            let address_type = frame
                .address_type
                .unwrap_or_else(|| AddressType::infer(&address));
            Ok((address, address_type))
        }
        _ => Err(malformed("unsupported `did` payload")),
    }
}

fn malformed(reason: &str) -> RingchatError {
    RingchatError::transport(format!("malformed presence frame: {}", reason))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
