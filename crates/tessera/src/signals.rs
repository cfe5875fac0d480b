//! Signal handling for graceful client shutdown.
//!
//! Supports SIGINT and SIGTERM on Unix, Ctrl+C on Windows. The application
//! releases its room session once a signal arrives, which tears the
//! connection and all timers down through the session guard.

use tokio::signal;
use tracing::info;

/// Waits until a termination signal is received.
pub async fn wait_for_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    info!("📡 Received shutdown signal - releasing session");
    Ok(())
}
