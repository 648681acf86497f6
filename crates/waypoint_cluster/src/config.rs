//! Cluster settings and their defaults.
//!
//! All durations are in milliseconds of the shard clock.

use serde::{Deserialize, Serialize};

/// How the roles are spread over processes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Every role inside a single process.
    #[default]
    AllInOne,
    /// One app manager, one db, and the given number of space and game processes.
    Split { spaces: u16, games: u16 },
}

/// Timing knobs shared by every process of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// How long a teleport may wait for its target world and player sync
    pub teleport_timeout_ms: u64,

    /// How long lobby players wait for a world to be created
    pub creation_timeout_ms: u64,

    pub world_sync_interval_ms: u64,

    pub app_sync_interval_ms: u64,

    pub teleport_sweep_interval_ms: u64,

    pub lobby_sweep_interval_ms: u64,

    /// Retry period for lost outbound links
    pub reconnect_interval_ms: u64,

    pub topology: Topology,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            teleport_timeout_ms: 10_000,
            creation_timeout_ms: 10_000,
            world_sync_interval_ms: 2_000,
            app_sync_interval_ms: 3_000,
            teleport_sweep_interval_ms: 500,
            lobby_sweep_interval_ms: 1_000,
            reconnect_interval_ms: 3_000,
            topology: Topology::AllInOne,
        }
    }
}
