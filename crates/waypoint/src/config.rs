//! Configuration management for the Waypoint server.
//!
//! This module handles loading and validation of the server configuration from TOML
//! files. A missing file is created with the defaults.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;
use waypoint_cluster::ClusterSettings;
use waypoint_runtime::{Position, StaticWorldCatalog, WorldInfo, WorldKind};

/// Default tick interval for serde deserialization
fn default_tick_ms() -> u64 {
    5
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeSettings,
    /// Timers, timeouts and the process layout
    #[serde(default)]
    pub cluster: ClusterSettings,
    pub logging: LoggingSettings,
    /// World definitions known to every process
    #[serde(default = "default_worlds")]
    pub worlds: Vec<WorldInfo>,
}

/// Settings of the shard threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// How long an idle shard sleeps before polling its queue again
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn world(id: u32, name: &str, kind: WorldKind, spawn: Position) -> WorldInfo {
    WorldInfo {
        id,
        name: name.to_string(),
        kind,
        spawn,
    }
}

fn default_worlds() -> Vec<WorldInfo> {
    vec![
        world(1, "roles", WorldKind::Roles, Position::default()),
        world(2, "harbor", WorldKind::Public, Position::new(10.0, 0.0, 10.0)),
        world(3, "highlands", WorldKind::Public, Position::new(-40.0, 12.0, 5.0)),
        world(10, "catacombs", WorldKind::Dungeon, Position::new(0.0, -20.0, 0.0)),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            cluster: ClusterSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            worlds: default_worlds(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified
    /// path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// World catalog shared by every process of the cluster.
    pub fn catalog(&self) -> StaticWorldCatalog {
        StaticWorldCatalog::new(self.worlds.iter().cloned())
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            );
        }

        if self.node.tick_ms == 0 {
            bail!("node.tick_ms must be greater than 0");
        }

        let timers = [
            ("teleport_timeout_ms", self.cluster.teleport_timeout_ms),
            ("creation_timeout_ms", self.cluster.creation_timeout_ms),
            ("world_sync_interval_ms", self.cluster.world_sync_interval_ms),
            ("app_sync_interval_ms", self.cluster.app_sync_interval_ms),
            ("teleport_sweep_interval_ms", self.cluster.teleport_sweep_interval_ms),
            ("lobby_sweep_interval_ms", self.cluster.lobby_sweep_interval_ms),
            ("reconnect_interval_ms", self.cluster.reconnect_interval_ms),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, value)| *value == 0) {
            bail!("cluster.{name} must be greater than 0");
        }

        let mut ids = BTreeSet::new();
        for info in &self.worlds {
            if !ids.insert(info.id) {
                bail!("World id {} is defined twice", info.id);
            }
        }
        let count = |kind: WorldKind| self.worlds.iter().filter(|info| info.kind == kind).count();
        if count(WorldKind::Roles) != 1 {
            bail!("Exactly one world of kind 'roles' is required");
        }
        if count(WorldKind::Public) == 0 {
            bail!("At least one world of kind 'public' is required");
        }

        Ok(())
    }
}
