//! # Waypoint Server - Main Entry Point
//!
//! Runs a whole Waypoint cluster (app manager, db, spaces and game gateways) inside
//! one OS process, with each shard on its own thread. This entry point handles CLI
//! parsing, configuration loading, logging and the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Every role in one process
//! waypoint
//!
//! # Custom configuration, split into 2 spaces and 3 game gateways
//! waypoint --config production.toml --spaces 2 --games 3
//!
//! # JSON logging
//! waypoint --json-logs --log-level debug
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`). If the
//! file doesn't exist, a default configuration will be created.
//!
//! ## Console
//!
//! Lines typed on stdin are operator commands (`world`, `app`, `create`, `pool`)
//! broadcast to every shard.
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM drain the shards and shut down; a second signal exits at once.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

pub use app::{Application, Running};
pub use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings, NodeSettings};

/// Parses the command line, sets up logging and runs the application until shutdown.
///
/// Called from `main` inside the tokio runtime.
pub async fn init() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Logging first, from whatever the file says; the file is loaded again below.
    let mut logging = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default()
        .logging;
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
