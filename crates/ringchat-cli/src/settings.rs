//! Persisted endpoint settings
//!
//! The relay (TURN) URL and the `;`-separated bootstrap node list live in a
//! small TOML file under the platform config directory. Missing values fall
//! back to build-time defaults and are written back on load, so the file
//! always reflects what the client actually uses.

use std::path::{Path, PathBuf};

use ringchat_runtime::Endpoints;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CliError, Result};

/// Used when `RINGCHAT_TURN_URL` was not set at build time
pub const FALLBACK_TURN_URL: &str = "stun://stun.l.google.com:19302";
/// Used when `RINGCHAT_NODE_URL` was not set at build time
pub const FALLBACK_NODE_URL: &str = "http://127.0.0.1:50000";

const SETTINGS_DIR: &str = "ringchat";
const SETTINGS_FILE: &str = "settings.toml";

/// On-disk shape; every field is optional so partial files still load
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    turn_url: Option<String>,
    node_url: Option<String>,
}

// ----------------------------------------------------------------------------
// Endpoint Settings
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub turn_url: String,
    pub node_url: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            turn_url: option_env!("RINGCHAT_TURN_URL")
                .unwrap_or(FALLBACK_TURN_URL)
                .to_string(),
            node_url: option_env!("RINGCHAT_NODE_URL")
                .unwrap_or(FALLBACK_NODE_URL)
                .to_string(),
        }
    }
}

impl EndpointSettings {
    /// `<config dir>/ringchat/settings.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
            .ok_or_else(|| CliError::Config("no platform config directory".to_string()))
    }

    /// Load settings, filling gaps with defaults and persisting the result
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let stored = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str::<StoredSettings>(&raw)?
        } else {
            debug!(path = %path.display(), "no settings file yet");
            StoredSettings::default()
        };

        let defaults = Self::default();
        let complete = non_empty(&stored.turn_url) && non_empty(&stored.node_url);
        let settings = Self {
            turn_url: pick(stored.turn_url, defaults.turn_url),
            node_url: pick(stored.node_url, defaults.node_url),
        };

        if !complete {
            settings.save(path)?;
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredSettings {
            turn_url: Some(self.turn_url.clone()),
            node_url: Some(self.node_url.clone()),
        };
        std::fs::write(path, toml::to_string_pretty(&stored)?)?;
        info!(path = %path.display(), "endpoint settings saved");
        Ok(())
    }

    /// Replace the given fields; empty values are rejected
    ///
    /// Nothing is changed unless every given value is valid.
    pub fn update(&mut self, turn_url: Option<String>, node_url: Option<String>) -> Result<()> {
        let turn_url = turn_url.map(|v| v.trim().to_string());
        let node_url = node_url.map(|v| v.trim().to_string());

        if turn_url.as_deref().is_some_and(str::is_empty) {
            return Err(CliError::Config("turn url cannot be empty".to_string()));
        }
        if let Some(node_url) = &node_url {
            if Endpoints::parse("", node_url).bootstrap_urls.is_empty() {
                return Err(CliError::Config(
                    "node url must list at least one bootstrap node".to_string(),
                ));
            }
        }

        if let Some(turn_url) = turn_url {
            self.turn_url = turn_url;
        }
        if let Some(node_url) = node_url {
            self.node_url = node_url;
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::parse(&self.turn_url, &self.node_url)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn pick(value: Option<String>, default: String) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
