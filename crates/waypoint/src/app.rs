//! Main application logic and lifecycle management.
//!
//! The `Application` owns the merged configuration. Starting it builds the cluster,
//! moves every shard onto its own thread and hands back a [`Running`] handle used to
//! feed console commands and to drain the shards on shutdown.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use waypoint_cluster::{Cluster, ConsoleSink, MemoryNetwork};
use waypoint_runtime::{ShardHandle, ShardStats, ShutdownState, SystemClock};

/// How long shutdown waits for the shards to drain their queues.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(8);

const HEALTH_INTERVAL: Duration = Duration::from_secs(60);

pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Loads the configuration, applies command-line overrides and validates the result.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let config = AppConfig::load_from_file(&args.config_path).await?;
        let app = Self::with_config(config, &args)?;
        display_banner();
        Ok(app)
    }

    /// Builds the application from an already loaded configuration.
    pub fn with_config(mut config: AppConfig, args: &CliArgs) -> anyhow::Result<Self> {
        if let Some(log_level) = &args.log_level {
            config.logging.level = log_level.clone();
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(topology) = args.topology {
            config.cluster.topology = topology;
        }
        if let Some(tick_ms) = args.tick_ms {
            config.node.tick_ms = tick_ms;
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;
        info!("✅ Configuration loaded and validated successfully");
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Builds the cluster and starts every shard.
    pub fn start(&self) -> anyhow::Result<Running> {
        self.log_configuration_summary();

        let cluster = Cluster::build(
            &self.config.cluster,
            Arc::new(self.config.catalog()),
            Arc::new(SystemClock),
        )?;
        let console = cluster.console();
        let network = Arc::clone(cluster.network());
        let processes = cluster.nodes().count();

        let shutdown = ShutdownState::new();
        let handles = cluster.start(&shutdown, Duration::from_millis(self.config.node.tick_ms))?;
        info!("🧵 {} shards running in {} processes", handles.len(), processes);

        Ok(Running {
            shutdown,
            console,
            network,
            handles,
        })
    }

    /// Runs until a shutdown signal arrives, reading console commands from stdin.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("🌟 Starting Waypoint server");
        let running = self.start()?;

        let console = running.console().clone();
        let console_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        console.submit(&line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("⌨️ Console input closed: {}", e);
                        break;
                    }
                }
            }
        });

        let monitoring_handle = {
            let console = running.console().clone();
            let network = Arc::clone(running.network());
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let pending = console.pending();
                    info!(
                        "📊 System Health - {} clients connected | {} packets queued",
                        network.client_count(),
                        pending
                    );
                    if pending > 10_000 {
                        warn!("🔥 Shards are falling behind - {} packets waiting", pending);
                    }
                }
            })
        };

        info!("✅ Waypoint is now running!");
        info!("⌨️ Console commands: world, app, create, pool");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        signals::wait_for_shutdown(running.shutdown_state()).await?;

        tokio::spawn(async move {
            if let Err(e) = signals::wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        console_handle.abort();
        monitoring_handle.abort();
        let stats = running.stop().await;
        log_final_statistics(&stats);

        info!("✅ Waypoint shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        let cluster = &self.config.cluster;
        info!("📋 Configuration Summary:");
        info!("  🗺️ Topology: {:?}", cluster.topology);
        info!("  🌍 Worlds: {}", self.config.worlds.len());
        info!(
            "  ⏱️ Teleport timeout: {}ms | Creation timeout: {}ms",
            cluster.teleport_timeout_ms, cluster.creation_timeout_ms
        );
        info!(
            "  🔁 Sync every {}ms (worlds) / {}ms (apps)",
            cluster.world_sync_interval_ms, cluster.app_sync_interval_ms
        );
        info!("  🧵 Shard idle tick: {}ms", self.config.node.tick_ms);
    }
}

/// A started cluster.
pub struct Running {
    shutdown: ShutdownState,
    console: ConsoleSink,
    network: Arc<MemoryNetwork>,
    handles: Vec<ShardHandle>,
}

impl Running {
    pub fn console(&self) -> &ConsoleSink {
        &self.console
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown
    }

    /// Drains every shard and returns the stats of those that exited cleanly.
    pub async fn stop(self) -> Vec<ShardStats> {
        if !self.shutdown.is_shutdown_initiated() {
            self.shutdown.initiate_shutdown();
        }

        info!("⏳ Waiting for {} shards to drain...", self.handles.len());
        let handles = self.handles;
        let joined = tokio::task::spawn_blocking(move || {
            handles
                .into_iter()
                .filter_map(ShardHandle::join)
                .collect::<Vec<_>>()
        });
        let stats = match tokio::time::timeout(DRAIN_TIMEOUT, joined).await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                error!("❌ Shard join task failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("⏰ Shards did not drain within {:?}, proceeding with shutdown", DRAIN_TIMEOUT);
                Vec::new()
            }
        };

        self.shutdown.complete_shutdown();
        stats
    }
}

fn log_final_statistics(stats: &[ShardStats]) {
    info!("📊 Final Statistics:");
    for shard in stats {
        info!(
            "  - {}: {} packets dispatched ({} by default handlers), {} components",
            shard.name, shard.router.dispatched, shard.router.default_fallbacks, shard.components
        );
    }
}
