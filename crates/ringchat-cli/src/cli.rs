//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Endpoint settings file (defaults to the platform config dir)
    #[arg(short, long)]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or change the persisted relay and bootstrap endpoints
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Presence service tools
    Presence {
        #[command(subcommand)]
        action: PresenceAction,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the resolved endpoint settings
    Show,
    /// Update one or both endpoints
    Set {
        /// TURN/STUN relay URL
        #[arg(long)]
        turn_url: Option<String>,
        /// Bootstrap node URLs, separated by `;`
        #[arg(long)]
        node_url: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PresenceAction {
    /// Follow the online roster until interrupted
    Watch {
        /// Presence websocket URL
        #[arg(short, long)]
        url: Option<String>,
        /// Announce this address while watching
        #[arg(short, long)]
        address: Option<String>,
        /// Address type of `--address` (DEFAULT, ED25519, BIP137); inferred if omitted
        #[arg(long)]
        address_type: Option<String>,
    },
}
