//! Signal handling for graceful server shutdown.
//!
//! The first signal starts the drain of every shard; a second one exits at once.

use tokio::signal;
use tracing::info;
use waypoint_runtime::ShutdownState;

/// Waits for a termination signal and initiates shutdown on `shutdown`.
///
/// On Unix both SIGINT and SIGTERM count; elsewhere only Ctrl+C.
pub async fn wait_for_shutdown(shutdown: &ShutdownState) -> std::io::Result<()> {
    wait_for_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    shutdown.initiate_shutdown();
    Ok(())
}

pub async fn wait_for_signal() -> std::io::Result<()> {
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

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    Ok(())
}
