//! Logging system setup and configuration.
//!
//! Human-readable or JSON output through `tracing-subscriber`, filtered by `RUST_LOG`
//! when set and by the configured level otherwise.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system.
///
/// Shard threads are named after their role and app id, so thread names stay on in
/// both formats.
pub fn setup_logging(config: &LoggingSettings, json_format: bool) -> anyhow::Result<()> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(false)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Displays the startup banner.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🧭 WAYPOINT SERVER 🧭         ║");
    info!("║                 v{:<24}║", version);
    info!("║                                          ║");
    info!("║  🏛️  App manager   🎮 Game gateways       ║");
    info!("║  🌍 Spaces        💾 Player records      ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
