//! Command-line interface for the Tessera client.
//!
//! Argument parsing is handled with `clap`; every option overrides the
//! corresponding configuration file setting.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file.
    pub config_path: PathBuf,
    /// Room code to join.
    pub room: String,
    /// Display name override.
    pub username: Option<String>,
    /// Session token presented during the handshake.
    pub token: String,
    /// Optional override for the WebSocket server URL.
    pub server_url: Option<String>,
    /// Optional override for the snapshot API base URL.
    pub api_url: Option<String>,
    /// Optional override for the log level.
    pub log_level: Option<String>,
    /// Whether to force JSON log output.
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    ///
    /// All options except the room code have defaults or fall back to the
    /// configuration file.
    pub fn parse() -> Self {
        let matches = Command::new("Tessera Client")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Terminal client for the Tessera multiplayer puzzle game")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("tessera.toml"),
            )
            .arg(
                Arg::new("room")
                    .short('r')
                    .long("room")
                    .value_name("CODE")
                    .help("Room code to join")
                    .required(true),
            )
            .arg(
                Arg::new("name")
                    .short('n')
                    .long("name")
                    .value_name("NAME")
                    .help("Display name shown to other players"),
            )
            .arg(
                Arg::new("token")
                    .short('t')
                    .long("token")
                    .value_name("TOKEN")
                    .help("Session token for the handshake")
                    .default_value("local-dev"),
            )
            .arg(
                Arg::new("server")
                    .short('s')
                    .long("server")
                    .value_name("URL")
                    .help("WebSocket server URL (e.g. ws://localhost:8080/ws)"),
            )
            .arg(
                Arg::new("api")
                    .long("api")
                    .value_name("URL")
                    .help("Snapshot API base URL (e.g. http://localhost:8080)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("default config path is always set"),
            ),
            room: matches
                .get_one::<String>("room")
                .expect("room is a required argument")
                .clone(),
            username: matches.get_one::<String>("name").cloned(),
            token: matches
                .get_one::<String>("token")
                .expect("default token is always set")
                .clone(),
            server_url: matches.get_one::<String>("server").cloned(),
            api_url: matches.get_one::<String>("api").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
