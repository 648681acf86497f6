//! # Node assembly
//!
//! A [`Node`] is one process of the cluster: an app key, a listening endpoint and one
//! shard per role it carries. Building a node wires the shared services (serial number
//! generator, directory, world catalog) and spawns the role components:
//!
//! | Role        | Components                                             |
//! |-------------|--------------------------------------------------------|
//! | app manager | [`CreateWorldRegistry`]                                |
//! | game        | [`SpaceDirectory`], [`WorldProxyFactory`], [`Lobby`]   |
//! | space       | [`WorldOperator`], [`WorldGather`]                     |
//! | db          | [`PlayerArchive`]                                      |
//!
//! The first shard also runs the [`LinkAgent`] of the process.

use crate::appmgr::{CreateWorldRegistry, RegistryInit};
use crate::config::ClusterSettings;
use crate::db::{PlayerArchive, PlayerStore};
use crate::error::ClusterError;
use crate::game::{FactoryInit, Lobby, LobbyInit, SpaceDirectory, WorldProxyFactory};
use crate::network::MemoryNetwork;
use crate::space::{GatherInit, OperatorInit, WorldGather, WorldOperator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use waypoint_runtime::{
    AppKey, AppType, Clock, Component, Destination, Directory, LinkAgent, LinkAgentInit, MsgId, Outbound, Packet,
    PacketQueue, ProcessDiscovery, ProcessServices, Shard, ShardContext, ShardHandle, ShardStats, ShutdownState, Sn,
    SnGenerator, SocketKey, TransportError, WorldCatalog,
};

/// Inbound side of a node: the shard queues and the client routing rules.
pub struct LocalDelivery {
    directory: Arc<Directory>,
    queues: Vec<(AppType, Arc<PacketQueue>)>,
}

impl LocalDelivery {
    pub fn new(directory: Arc<Directory>, queues: Vec<(AppType, Arc<PacketQueue>)>) -> Self {
        Self { directory, queues }
    }

    /// Queues `packet` on every shard.
    pub fn deliver(&self, packet: Packet) {
        let packet = Arc::new(packet);
        for (_, queue) in &self.queues {
            queue.push(Arc::clone(&packet));
        }
    }

    /// Queues a client packet on the game shards, addressed to the socket's owner.
    pub fn deliver_client(&self, mut packet: Packet) {
        let socket = packet.tags.socket;
        if packet.tags.entity.is_none() {
            packet.tags.entity = socket.and_then(|socket| self.directory.sockets.resolve_owner(socket));
        }
        let closing = packet.msg_id == MsgId::NetworkDisconnect;

        let packet = Arc::new(packet);
        let mut delivered = false;
        for (_, queue) in self.queues.iter().filter(|(role, _)| role.intersects(AppType::GAME)) {
            queue.push(Arc::clone(&packet));
            delivered = true;
        }
        if !delivered {
            for (_, queue) in &self.queues {
                queue.push(Arc::clone(&packet));
            }
        }

        if closing {
            if let Some(socket) = socket {
                self.directory.sockets.unbind(socket);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.queues.iter().map(|(_, queue)| queue.len()).sum()
    }
}

/// [`Outbound`] of a node attached to a [`MemoryNetwork`].
pub struct NodeLink {
    identity: AppKey,
    network: Arc<MemoryNetwork>,
    local: Arc<LocalDelivery>,
}

impl Outbound for NodeLink {
    fn dispatch_local(&self, packet: Packet) {
        self.local.deliver(packet);
    }

    fn send(&self, to: Destination, packet: Packet) -> Result<(), TransportError> {
        self.network.send(self.identity, to, packet)
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.network.connect(self.identity, endpoint)
    }

    fn close_client(&self, socket: SocketKey) {
        self.network.close_client(socket);
    }
}

/// Services shared by all nodes of a cluster.
#[derive(Clone)]
pub struct NodeEnv {
    pub network: Arc<MemoryNetwork>,
    pub catalog: Arc<dyn WorldCatalog>,
    pub discovery: Arc<dyn ProcessDiscovery>,
    pub store: Arc<dyn PlayerStore>,
    pub clock: Arc<dyn Clock>,
}

/// One process of the cluster.
pub struct Node {
    key: AppKey,
    endpoint: String,
    network: Arc<MemoryNetwork>,
    directory: Arc<Directory>,
    delivery: Arc<LocalDelivery>,
    shards: Vec<Shard>,
}

impl Node {
    pub fn build(
        key: AppKey,
        endpoint: impl Into<String>,
        env: &NodeEnv,
        settings: &ClusterSettings,
    ) -> Result<Self, ClusterError> {
        let endpoint = endpoint.into();
        let roles: Vec<AppType> = key.app_type.roles().collect();
        if roles.is_empty() {
            return Err(ClusterError::Config(format!("{} carries no role", key)));
        }

        let directory = Arc::new(Directory::new(key));
        let queues: Vec<(AppType, Arc<PacketQueue>)> =
            roles.iter().map(|&role| (role, Arc::new(PacketQueue::new()))).collect();
        let delivery = Arc::new(LocalDelivery::new(Arc::clone(&directory), queues.clone()));
        let services = ProcessServices {
            identity: key,
            sn: Arc::new(SnGenerator::new(key.app_id)?),
            outbound: Arc::new(NodeLink {
                identity: key,
                network: Arc::clone(&env.network),
                local: Arc::clone(&delivery),
            }),
            directory: Arc::clone(&directory),
            catalog: Arc::clone(&env.catalog),
        };
        env.network.register(key, endpoint.clone(), Arc::clone(&delivery));

        let mut shards = Vec::with_capacity(queues.len());
        for (index, (role, queue)) in queues.into_iter().enumerate() {
            let ctx = ShardContext::new(role, services.clone(), env.clock.now_ms());
            let mut shard = Shard::new(format!("{}-{}", role, key.app_id), ctx, queue, Arc::clone(&env.clock));
            if index == 0 {
                shard.spawn::<LinkAgent>(LinkAgentInit {
                    discovery: Arc::clone(&env.discovery),
                    retry_interval_ms: settings.reconnect_interval_ms,
                })?;
            }
            Self::spawn_role(&mut shard, role, &endpoint, env, settings)?;
            shards.push(shard);
        }

        info!("🏗️ Node {} built with {} shards on {}", key, shards.len(), endpoint);
        Ok(Self {
            key,
            endpoint,
            network: Arc::clone(&env.network),
            directory,
            delivery,
            shards,
        })
    }

    fn spawn_role(
        shard: &mut Shard,
        role: AppType,
        endpoint: &str,
        env: &NodeEnv,
        settings: &ClusterSettings,
    ) -> Result<(), ClusterError> {
        match role {
            AppType::APP_MANAGER => {
                shard.spawn::<CreateWorldRegistry>(RegistryInit {
                    creation_timeout_ms: settings.creation_timeout_ms,
                })?;
            }
            AppType::GAME => {
                shard.spawn::<SpaceDirectory>(())?;
                shard.spawn::<WorldProxyFactory>(FactoryInit {
                    teleport_timeout_ms: settings.teleport_timeout_ms,
                    sweep_interval_ms: settings.teleport_sweep_interval_ms,
                })?;
                shard.spawn::<Lobby>(LobbyInit {
                    creation_timeout_ms: settings.creation_timeout_ms,
                    sweep_interval_ms: settings.lobby_sweep_interval_ms,
                })?;
            }
            AppType::SPACE => {
                shard.spawn::<WorldOperator>(OperatorInit {
                    world_sync_interval_ms: settings.world_sync_interval_ms,
                })?;
                shard.spawn::<WorldGather>(GatherInit {
                    endpoint: endpoint.to_string(),
                    app_sync_interval_ms: settings.app_sync_interval_ms,
                })?;
            }
            AppType::DB => {
                shard.spawn::<PlayerArchive>(Arc::clone(&env.store))?;
            }
            _ => debug!("Role {} runs no components", role),
        }
        Ok(())
    }

    pub fn key(&self) -> AppKey {
        self.key
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Opens a link to the node listening on `endpoint`.
    pub fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.network.connect(self.key, endpoint)
    }

    pub fn delivery(&self) -> &Arc<LocalDelivery> {
        &self.delivery
    }

    /// Queues `packet` on every shard of this node.
    pub fn deliver(&self, packet: Packet) {
        self.delivery.deliver(packet);
    }

    /// Ticks every shard once. Returns the number of packets dispatched.
    pub fn tick(&mut self) -> usize {
        self.shards.iter_mut().map(Shard::tick).sum()
    }

    /// Packets queued and not yet dispatched.
    pub fn pending(&self) -> usize {
        self.delivery.pending()
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn shard(&self, role: AppType) -> Option<&Shard> {
        self.shards.iter().find(|shard| shard.role() == role)
    }

    pub fn shard_mut(&mut self, role: AppType) -> Option<&mut Shard> {
        self.shards.iter_mut().find(|shard| shard.role() == role)
    }

    /// First component of type `C` on any shard.
    pub fn component<C: Component>(&self) -> Option<(&ShardContext, Sn, &C)> {
        self.shards.iter().find_map(|shard| {
            let ctx = shard.context();
            let sn = ctx.entities.first::<C>()?;
            ctx.get::<C>(sn).map(|component| (ctx, sn, component))
        })
    }

    pub fn stats(&self) -> Vec<ShardStats> {
        self.shards.iter().map(Shard::stats).collect()
    }

    /// Moves every shard onto its own thread.
    pub fn start(self, shutdown: &ShutdownState, tick: Duration) -> std::io::Result<Vec<ShardHandle>> {
        self.shards
            .into_iter()
            .map(|shard| shard.start(shutdown.clone(), tick))
            .collect()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("endpoint", &self.endpoint)
            .field("shards", &self.shards.len())
            .finish()
    }
}
