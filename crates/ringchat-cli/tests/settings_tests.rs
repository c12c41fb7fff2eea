//! Endpoint settings persistence and argument parsing tests

use clap::Parser;
use ringchat_cli::cli::{PresenceAction, SettingsAction};
use ringchat_cli::{Cli, Commands, EndpointSettings};
use tempfile::TempDir;

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ringchat").join("settings.toml");

    let settings = EndpointSettings::load_or_init(&path).unwrap();
    assert_eq!(settings, EndpointSettings::default());
    assert!(path.exists());

    let reloaded = EndpointSettings::load_or_init(&path).unwrap();
    assert_eq!(reloaded, settings);
}

#[test]
fn test_partial_file_is_completed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "turn_url = \"turn://custom:3478\"\n").unwrap();

    let settings = EndpointSettings::load_or_init(&path).unwrap();
    assert_eq!(settings.turn_url, "turn://custom:3478");
    assert_eq!(settings.node_url, EndpointSettings::default().node_url);

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("node_url"));
}

#[test]
fn test_saved_update_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.toml");

    let mut settings = EndpointSettings::load_or_init(&path).unwrap();
    settings
        .update(None, Some("http://a:50000; http://b:50000".to_string()))
        .unwrap();
    settings.save(&path).unwrap();

    let reloaded = EndpointSettings::load_or_init(&path).unwrap();
    assert_eq!(
        reloaded.endpoints().bootstrap_urls,
        vec!["http://a:50000", "http://b:50000"]
    );
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "turn_url = [").unwrap();

    assert!(EndpointSettings::load_or_init(&path).is_err());
}

#[test]
fn test_parse_settings_set() {
    let cli = Cli::try_parse_from([
        "ringchat",
        "--verbose",
        "settings",
        "set",
        "--node-url",
        "http://a;http://b",
    ])
    .unwrap();

    assert!(cli.verbose);
    match cli.command {
        Commands::Settings {
            action: SettingsAction::Set { turn_url, node_url },
        } => {
            assert_eq!(turn_url, None);
            assert_eq!(node_url.as_deref(), Some("http://a;http://b"));
        }
        _ => panic!("expected settings set"),
    }
}

#[test]
fn test_parse_presence_watch() {
    let cli = Cli::try_parse_from([
        "ringchat",
        "presence",
        "watch",
        "--url",
        "ws://localhost:9000/ws",
        "--address",
        "0xAA",
    ])
    .unwrap();

    match cli.command {
        Commands::Presence {
            action:
                PresenceAction::Watch {
                    url,
                    address,
                    address_type,
                },
        } => {
            assert_eq!(url.as_deref(), Some("ws://localhost:9000/ws"));
            assert_eq!(address.as_deref(), Some("0xAA"));
            assert!(address_type.is_none());
        }
        _ => panic!("expected presence watch"),
    }
}
