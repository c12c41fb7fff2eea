//! Error types for the ringchat session layer
//!
//! A single error enum is shared by identity resolution, the presence channel,
//! the session store and the connection orchestrator so that UI actions can
//! match on the failure kind directly.

use thiserror::Error;

use crate::types::Chain;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by the ringchat session layer
#[derive(Debug, Error)]
pub enum RingchatError {
    /// Wallet rejected or failed to sign the auth challenge
    #[error("Authentication failed on {chain}: {reason}")]
    AuthenticationFailed { chain: Chain, reason: String },

    /// Operation attempted while the overlay session is not ready
    #[error("Session not ready (phase: {phase})")]
    SessionNotReady { phase: String },

    /// Transport could not route to the requested address
    #[error("Peer unreachable: {peer}: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// Answer accepted for a transport id that has no pending offer
    #[error("No pending offer for transport {transport_id}")]
    HandshakeMismatch { transport_id: String },

    /// Presence channel not open
    #[error("Presence channel unavailable")]
    ChannelUnavailable,

    /// Name lookup failed (never surfaced past the resolver)
    #[error("Name resolution failed for {address}: {reason}")]
    NameResolutionFailed { address: String, reason: String },

    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Refusing to send an empty message")]
    EmptyMessage,

    /// Opaque failure reported by the overlay transport client
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session store task has shut down
    #[error("Session store closed")]
    StoreClosed,
}

impl RingchatError {
    /// Shorthand for wrapping a transport failure message
    pub fn transport(reason: impl ToString) -> Self {
        RingchatError::Transport(reason.to_string())
    }
}

/// Result type for ringchat operations
pub type Result<T> = std::result::Result<T, RingchatError>;
