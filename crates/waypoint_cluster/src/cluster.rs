//! # Cluster
//!
//! Builds every node of a topology on one [`MemoryNetwork`] and links them the way the
//! processes of a deployment link up:
//!
//! - game processes connect to the app manager, the db and every space
//! - space processes connect to the app manager and the db
//!
//! App ids are unique across the whole cluster, since serial numbers carry the id of
//! the process that generated them.

use crate::config::{ClusterSettings, Topology};
use crate::console::ConsoleSink;
use crate::db::MemoryPlayerStore;
use crate::error::ClusterError;
use crate::network::{ClientHandle, MemoryNetwork};
use crate::node::{Node, NodeEnv};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use waypoint_runtime::{
    AppId, AppKey, AppType, Clock, Packet, ShardHandle, ShutdownState, StaticDiscovery, WorldCatalog,
};

/// Process keys of a topology, app manager first.
pub fn layout(topology: Topology) -> Vec<AppKey> {
    match topology {
        Topology::AllInOne => vec![AppKey::new(AppType::ALL_IN_ONE, 1)],
        Topology::Split { spaces, games } => {
            let mut keys = vec![AppKey::new(AppType::APP_MANAGER, 1), AppKey::new(AppType::DB, 2)];
            let mut next: AppId = 3;
            for _ in 0..spaces {
                keys.push(AppKey::new(AppType::SPACE, next));
                next += 1;
            }
            for _ in 0..games {
                keys.push(AppKey::new(AppType::GAME, next));
                next += 1;
            }
            keys
        }
    }
}

pub fn endpoint_of(key: AppKey) -> String {
    format!("mem://{}-{}", key.app_type, key.app_id)
}

/// Rejects layouts in which two processes share an app id.
pub fn validate_layout(keys: &[AppKey]) -> Result<(), ClusterError> {
    let mut seen = BTreeSet::new();
    for key in keys {
        if !seen.insert(key.app_id) {
            return Err(ClusterError::Config(format!("App id {} is used twice", key.app_id)));
        }
    }
    Ok(())
}

/// Links a process opens at startup.
fn upstreams(key: AppKey, keys: &[AppKey]) -> Vec<AppKey> {
    let wanted = if key.app_type.contains(AppType::GAME) {
        AppType::APP_MANAGER | AppType::DB | AppType::SPACE
    } else if key.app_type.contains(AppType::SPACE) {
        AppType::APP_MANAGER | AppType::DB
    } else {
        AppType::NONE
    };
    keys.iter()
        .copied()
        .filter(|other| *other != key && other.app_type.intersects(wanted))
        .collect()
}

/// All processes of a cluster, driven from one place.
pub struct Cluster {
    network: Arc<MemoryNetwork>,
    store: Arc<MemoryPlayerStore>,
    nodes: BTreeMap<AppKey, Node>,
}

impl Cluster {
    pub fn build(
        settings: &ClusterSettings,
        catalog: Arc<dyn WorldCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClusterError> {
        let keys = layout(settings.topology);
        validate_layout(&keys)?;

        let network = MemoryNetwork::new();
        let store = Arc::new(MemoryPlayerStore::new());
        let discovery: StaticDiscovery = keys.iter().map(|&key| (key, endpoint_of(key))).collect();
        let env = NodeEnv {
            network: Arc::clone(&network),
            catalog,
            discovery: Arc::new(discovery),
            store: store.clone(),
            clock,
        };

        let mut nodes = BTreeMap::new();
        for &key in &keys {
            nodes.insert(key, Node::build(key, endpoint_of(key), &env, settings)?);
        }
        for (&key, node) in &nodes {
            for upstream in upstreams(key, &keys) {
                node.connect(&endpoint_of(upstream))?;
            }
        }

        info!("🌍 Cluster of {} processes built ({:?})", nodes.len(), settings.topology);
        Ok(Self { network, store, nodes })
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    pub fn store(&self) -> &Arc<MemoryPlayerStore> {
        &self.store
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, key: AppKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub fn node_mut(&mut self, key: AppKey) -> Option<&mut Node> {
        self.nodes.get_mut(&key)
    }

    /// Keys of the processes carrying `app_type`.
    pub fn keys_of(&self, app_type: AppType) -> Vec<AppKey> {
        self.nodes.keys().copied().filter(|key| key.app_type.contains(app_type)).collect()
    }

    /// Ticks every node once. Returns the number of packets dispatched.
    pub fn tick(&mut self) -> usize {
        self.nodes.values_mut().map(Node::tick).sum()
    }

    /// Ticks until no node has anything left to do, at most `max_rounds` times.
    pub fn run_until_idle(&mut self, max_rounds: usize) -> usize {
        for round in 0..max_rounds {
            let dispatched = self.tick();
            if dispatched == 0 && self.pending() == 0 {
                return round;
            }
        }
        warn!("⚠️ Cluster still busy after {} rounds", max_rounds);
        max_rounds
    }

    pub fn pending(&self) -> usize {
        self.nodes.values().map(Node::pending).sum()
    }

    /// Connects a client to the game process `gateway`.
    pub fn open_client(&self, gateway: AppKey) -> Result<ClientHandle, ClusterError> {
        Ok(self.network.open_client(gateway)?)
    }

    /// Takes a process down. Its peers see the link drop.
    pub fn disconnect(&mut self, key: AppKey) -> Result<Node, ClusterError> {
        let node = self.nodes.remove(&key).ok_or(ClusterError::UnknownApp(key))?;
        self.network.disconnect_node(key);
        Ok(node)
    }

    /// Queues `packet` on every shard of every process.
    pub fn broadcast_local(&self, packet: Packet) {
        for node in self.nodes.values() {
            node.deliver(packet.clone());
        }
    }

    /// Handle that keeps reaching every shard once the cluster is started.
    pub fn console(&self) -> ConsoleSink {
        ConsoleSink::new(self.nodes.values().map(|node| Arc::clone(node.delivery())).collect())
    }

    /// Moves every shard of every process onto its own thread.
    pub fn start(self, shutdown: &ShutdownState, tick: Duration) -> Result<Vec<ShardHandle>, ClusterError> {
        let mut handles = Vec::new();
        for node in self.nodes.into_values() {
            handles.extend(node.start(shutdown, tick)?);
        }
        Ok(handles)
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster").field("nodes", &self.nodes.keys().collect::<Vec<_>>()).finish()
    }
}
