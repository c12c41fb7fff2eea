//! Session configuration
//!
//! Tunables for the runtime: how often the transport is polled, how the
//! presence channel connects and reconnects, and which wallet wins when
//! several are connected.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RingchatError};
use crate::identity::ChainPriority;
use crate::types::Chain;

/// Default presence service endpoint
pub const DEFAULT_PRESENCE_URL: &str = "ws://127.0.0.1:8080/ws";

// ----------------------------------------------------------------------------
// Presence Configuration
// ----------------------------------------------------------------------------

/// Configuration for the presence websocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Websocket URL of the presence service
    pub url: String,
    /// Reconnect attempts after an unexpected close before giving up
    pub reconnect_attempts: u32,
    /// Delay between reconnect attempts in milliseconds
    pub reconnect_interval_ms: u64,
    /// Announce the local identity when the channel opens
    pub visible: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PRESENCE_URL.to_string(),
            reconnect_attempts: 10,
            reconnect_interval_ms: 3_000,
            visible: true,
        }
    }
}

impl PresenceConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(RingchatError::InvalidConfiguration(format!(
                "presence url must use ws:// or wss://, got `{}`",
                self.url
            )));
        }
        if self.reconnect_attempts > 0 && self.reconnect_interval_ms == 0 {
            return Err(RingchatError::InvalidConfiguration(
                "reconnect interval must be non-zero when reconnecting".to_string(),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Top-level configuration for a chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between transport peer listings in milliseconds
    pub poll_interval_ms: u64,
    pub presence: PresenceConfig,
    /// Wallet chains in order of preference
    pub chain_priority: Vec<Chain>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            presence: PresenceConfig::default(),
            chain_priority: ChainPriority::default().chains().to_vec(),
        }
    }
}

impl SessionConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            poll_interval_ms: 50,
            presence: PresenceConfig {
                reconnect_attempts: 2,
                reconnect_interval_ms: 20,
                ..PresenceConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn chain_priority(&self) -> Result<ChainPriority> {
        ChainPriority::new(self.chain_priority.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(RingchatError::InvalidConfiguration(
                "poll interval must be non-zero".to_string(),
            ));
        }
        self.presence.validate()?;
        self.chain_priority()?;
        Ok(())
    }
}
