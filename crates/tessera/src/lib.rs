//! # Tessera - Multiplayer Puzzle Client
//!
//! Terminal client for the Tessera multiplayer puzzle game. This crate is a
//! thin shell: command-line parsing, TOML configuration with CLI overrides,
//! logging setup, and signal handling around the [`sync_client`]
//! synchronization layer, which does all of the real work.
//!
//! ## Startup Flow
//!
//! 1. Parse command-line arguments ([`cli::CliArgs::parse`])
//! 2. Load configuration, creating a default file on first run
//!    ([`config::AppConfig::load_from_file`])
//! 3. Apply CLI overrides and validate
//! 4. Initialize tracing-based logging ([`logging::setup_logging`])
//! 5. Acquire a room session and run until a termination signal arrives
//!    ([`app::Application`])

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;
