//! Main application logic and lifecycle management.
//!
//! The `Application` wires the command line and configuration file into the
//! synchronization layer, attaches a terminal consumer that logs the merged
//! room timeline, and coordinates graceful shutdown.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::{display_banner, setup_logging};
use crate::signals::wait_for_shutdown;
use std::sync::Arc;
use std::time::Duration;
use sync_client::{
    ConnectionState, Credentials, HttpRoomDirectory, MessageKind, RoomCode, SessionGuard,
    SessionHandle, UserId, WsConnector,
};
use tokio::time::interval;
use tracing::{info, warn};

/// Main application struct.
///
/// Owns the configuration and the player identity; the room session itself
/// lives behind the [`SessionGuard`] and exists only between `acquire` and
/// `release`.
pub struct Application {
    config: AppConfig,
    room: RoomCode,
    credentials: Credentials,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration (creating a default file if missing), applies
    /// command-line overrides, initializes logging, and validates the merged
    /// settings.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(server_url) = args.server_url {
            config.connection.server_url = server_url;
        }
        if let Some(api_url) = args.api_url {
            config.connection.api_url = api_url;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        setup_logging(&config.logging, config.logging.json_format)?;

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded from {}", args.config_path.display());

        let username = args.username.unwrap_or_else(|| config.player.username.clone());
        let credentials = Credentials {
            user_id: UserId::new(),
            username,
            token: args.token,
        };

        Ok(Self {
            config,
            room: RoomCode::new(&args.room),
            credentials,
        })
    }

    /// Runs the client until a termination signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        display_banner();
        info!("🎮 joining room {} as {}", self.room, self.credentials.username);
        info!("  🌐 Server: {}", self.config.connection.server_url);
        info!("  📷 Snapshot API: {}", self.config.connection.api_url);

        let guard = SessionGuard::new(
            self.config.connection.server_url.clone(),
            self.config.to_sync_config(),
            Arc::new(WsConnector),
            Arc::new(HttpRoomDirectory::new(self.config.connection.api_url.clone())),
        );

        let session = guard.acquire(self.room.clone(), self.credentials.clone()).await?;
        info!("✅ session established for room {}", self.room);

        let state_task = spawn_state_logger(&session);
        let timeline_task = spawn_timeline_logger(&session);
        let status_task = spawn_status_logger(&session);

        info!("🛑 Press Ctrl+C to leave the room");
        wait_for_shutdown().await?;

        guard.release(&self.room).await;
        state_task.abort();
        timeline_task.abort();
        status_task.abort();

        let stats = session.dispatcher().stats();
        info!("📊 Final Statistics:");
        info!("  - Frames published: {}", stats.published);
        info!("  - Handler deliveries: {}", stats.delivered);
        info!("  - Handler errors: {}", stats.handler_errors);
        info!("👋 Left room {}", self.room);

        Ok(())
    }
}

/// Logs every connection state transition.
fn spawn_state_logger(session: &SessionHandle) -> tokio::task::JoinHandle<()> {
    let mut state_rx = session.watch_connection();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            info!("🔌 connection state: {state}");
            if state == ConnectionState::Failed {
                warn!("connection lost for good; restart the client to rejoin");
            }
        }
    })
}

/// Periodically prints timeline entries that arrived since the last tick.
fn spawn_timeline_logger(session: &SessionHandle) -> tokio::task::JoinHandle<()> {
    let session = session.clone();
    tokio::spawn(async move {
        let mut last_seen: Option<String> = None;
        let mut ticker = interval(Duration::from_secs(2));
        loop {
            ticker.tick().await;
            let messages = session.messages();
            let start = last_seen
                .as_ref()
                .and_then(|id| messages.iter().position(|m| &m.id == id))
                .map(|i| i + 1)
                .unwrap_or(0);
            for message in &messages[start..] {
                let who = message.username.as_deref().unwrap_or("?");
                match message.kind {
                    MessageKind::User => info!("💬 {}: {}", who, message.text),
                    MessageKind::System => info!("📣 {}", message.text),
                    MessageKind::Game => info!("🎯 {}", message.text),
                }
            }
            if let Some(last) = messages.last() {
                last_seen = Some(last.id.clone());
            }
        }
    })
}

/// Logs a periodic room summary from the merged view.
fn spawn_status_logger(session: &SessionHandle) -> tokio::task::JoinHandle<()> {
    let session = session.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(30));
        // The first tick fires immediately; skip it so the summary starts
        // after the room has had a chance to sync.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let view = session.view();
            let started = view.room.as_ref().is_some_and(|r| r.started);
            info!(
                "📊 room status: {} players | started: {} | host: {} | can start: {}",
                view.players.len(),
                started,
                view.is_host,
                view.can_start
            );
        }
    })
}
