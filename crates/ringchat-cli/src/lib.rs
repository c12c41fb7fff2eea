//! Ringchat CLI library
//!
//! Endpoint settings persistence and command handlers for the `ringchat`
//! binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod settings;

pub use cli::{Cli, Commands};
pub use error::{CliError, Result};
pub use settings::EndpointSettings;
