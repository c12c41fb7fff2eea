//! Command handlers for the ringchat CLI

use std::path::PathBuf;

use ringchat_core::{Address, AddressType, PresenceConfig, SessionStore};
use ringchat_runtime::{LocalPresence, PresenceChannel, StoreHandle};
use tracing::info;

use crate::cli::{Cli, Commands, PresenceAction, SettingsAction};
use crate::error::Result;
use crate::settings::EndpointSettings;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli) -> Result<()> {
        let settings_path = match cli.settings {
            Some(path) => path,
            None => EndpointSettings::default_path()?,
        };

        match cli.command {
            Commands::Settings { action } => Self::handle_settings_command(settings_path, action),
            Commands::Presence {
                action:
                    PresenceAction::Watch {
                        url,
                        address,
                        address_type,
                    },
            } => Self::handle_presence_watch(url, address, address_type).await,
        }
    }

    /// Handle `settings show` and `settings set`
    fn handle_settings_command(path: PathBuf, action: SettingsAction) -> Result<()> {
        let mut settings = EndpointSettings::load_or_init(&path)?;

        match action {
            SettingsAction::Show => {}
            SettingsAction::Set { turn_url, node_url } => {
                settings.update(turn_url, node_url)?;
                settings.save(&path)?;
            }
        }

        println!("settings: {}", path.display());
        println!("turn url: {}", settings.turn_url);
        println!("bootstrap nodes:");
        for url in settings.endpoints().bootstrap_urls {
            println!("  {}", url);
        }
        Ok(())
    }

    /// Handle `presence watch`
    async fn handle_presence_watch(
        url: Option<String>,
        address: Option<String>,
        address_type: Option<String>,
    ) -> Result<()> {
        let local = match address {
            Some(raw) => {
                let address = Address::parse(&raw)?;
                let address_type = match address_type {
                    Some(name) => name.parse::<AddressType>()?,
                    None => AddressType::infer(&address),
                };
                Some(LocalPresence {
                    address,
                    address_type,
                })
            }
            None => None,
        };

        let mut config = PresenceConfig::default();
        if let Some(url) = url {
            config = config.with_url(url);
        }
        config.visible = local.is_some();
        config.validate()?;

        info!(url = %config.url, "watching presence roster");
        let (store, _store_task) = StoreHandle::spawn();
        let channel = PresenceChannel::open(config, local, store.clone(), None);
        let mut updates = store.subscribe();

        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = updates.borrow_and_update().clone();
                    print_roster(&view);
                }
                _ = &mut interrupted => {
                    info!("interrupted, closing presence channel");
                    break;
                }
            }
        }

        channel.shutdown().await;
        Ok(())
    }
}

fn print_roster(store: &SessionStore) {
    println!("-- {} online --", store.presence().len());
    for peer in store.presence().values() {
        println!(
            "{:<44} {:<8} {}",
            peer.address.as_str(),
            peer.address_type.as_str(),
            store.display_name(&peer.address)
        );
    }
}
