//! Logging system setup and configuration.
//!
//! Initializes tracing-subscriber with support for both human-readable and
//! JSON output, honoring `RUST_LOG` when set.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// `json_format` forces JSON output regardless of the config file (CLI
/// override). The `RUST_LOG` environment variable, when present, takes
/// precedence over the configured level.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer().json().with_file(false).with_line_number(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_file(false).with_line_number(false))
            .init();
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

/// Displays the startup banner using structured logging.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🧩 TESSERA CLIENT 🧩          ║");
    info!("║                 v{}                   ║", version);
    info!("║                                          ║");
    info!("║  Multiplayer Puzzle Rooms                ║");
    info!("║  Real-Time Synchronization Layer         ║");
    info!("╚══════════════════════════════════════════╝");
}
