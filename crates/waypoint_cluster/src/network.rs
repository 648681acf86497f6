//! # In-process network
//!
//! [`MemoryNetwork`] carries packets between the nodes of a cluster living in one OS
//! process, and between those nodes and their clients. It behaves like the socket
//! layer the runtime expects:
//!
//! - `connect` resolves an endpoint, records the link and reports `NetworkConnect` to
//!   the connecting node
//! - packets sent to another node are stamped with the sender's app key
//! - client packets are stamped with the client socket
//! - closing a client or dropping a node reports `NetworkDisconnect` to the peers
//!
//! Links are undirected: once either side connected, both may send.

use crate::node::LocalDelivery;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use waypoint_runtime::{
    AppKey, Destination, LinkUp, MsgId, Packet, RoutingTags, SocketKey, TransportError,
};

struct NodeSlot {
    endpoint: String,
    delivery: Arc<LocalDelivery>,
}

struct ClientSlot {
    gateway: AppKey,
    outbox: Sender<Packet>,
}

/// Packet switch between the nodes and clients of one cluster.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: DashMap<AppKey, NodeSlot>,
    endpoints: DashMap<String, AppKey>,
    clients: DashMap<SocketKey, ClientSlot>,
    links: Mutex<BTreeSet<(AppKey, AppKey)>>,
    next_socket: AtomicU64,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes a node reachable under `endpoint`.
    pub fn register(&self, key: AppKey, endpoint: impl Into<String>, delivery: Arc<LocalDelivery>) {
        let endpoint = endpoint.into();
        self.endpoints.insert(endpoint.clone(), key);
        self.nodes.insert(key, NodeSlot { endpoint, delivery });
        debug!("🌐 {} listening", key);
    }

    pub fn endpoint_of(&self, key: AppKey) -> Option<String> {
        self.nodes.get(&key).map(|slot| slot.endpoint.clone())
    }

    pub fn contains(&self, key: AppKey) -> bool {
        self.nodes.contains_key(&key)
    }

    fn delivery(&self, key: AppKey) -> Option<Arc<LocalDelivery>> {
        self.nodes.get(&key).map(|slot| Arc::clone(&slot.delivery))
    }

    fn linked(&self, a: AppKey, b: AppKey) -> bool {
        let links = self.links.lock();
        links.contains(&(a, b)) || links.contains(&(b, a))
    }

    /// Opens a link from `from` to the node listening on `endpoint`.
    pub fn connect(&self, from: AppKey, endpoint: &str) -> Result<(), TransportError> {
        let to = self
            .endpoints
            .get(endpoint)
            .map(|entry| *entry.value())
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.to_string()))?;
        let local = self.delivery(from).ok_or(TransportError::Closed)?;
        if !self.contains(to) {
            return Err(TransportError::UnknownEndpoint(endpoint.to_string()));
        }

        self.links.lock().insert((from, to));
        let up = Packet::new(
            MsgId::NetworkConnect,
            &LinkUp {
                endpoint: endpoint.to_string(),
            },
        )
        .map_err(|_| TransportError::Closed)?;
        local.deliver(up.with_tags(RoutingTags::default().app(to)));
        info!("🔗 {} connected to {} at {}", from, to, endpoint);
        Ok(())
    }

    /// Sends a packet from node `from`.
    pub fn send(&self, from: AppKey, to: Destination, mut packet: Packet) -> Result<(), TransportError> {
        match to {
            Destination::App(key) => {
                if !self.linked(from, key) {
                    return Err(TransportError::Unreachable(key));
                }
                let delivery = self.delivery(key).ok_or(TransportError::Unreachable(key))?;
                packet.tags.app = Some(from);
                delivery.deliver(packet);
                Ok(())
            }
            Destination::Client(socket) => {
                let client = self.clients.get(&socket).ok_or(TransportError::ClientGone(socket))?;
                client.outbox.send(packet).map_err(|_| TransportError::ClientGone(socket))
            }
        }
    }

    /// Accepts a new client on the gateway node `gateway`.
    pub fn open_client(self: &Arc<Self>, gateway: AppKey) -> Result<ClientHandle, TransportError> {
        if !self.contains(gateway) {
            return Err(TransportError::Unreachable(gateway));
        }
        let socket = SocketKey(self.next_socket.fetch_add(1, Ordering::Relaxed) + 1);
        let (outbox, inbox) = unbounded();
        self.clients.insert(socket, ClientSlot { gateway, outbox });
        debug!("🔌 Client {} accepted by {}", socket, gateway);
        Ok(ClientHandle {
            socket,
            network: Arc::clone(self),
            inbox,
        })
    }

    fn client_send(&self, socket: SocketKey, mut packet: Packet) -> Result<(), TransportError> {
        let gateway = self
            .clients
            .get(&socket)
            .map(|client| client.gateway)
            .ok_or(TransportError::ClientGone(socket))?;
        let delivery = self.delivery(gateway).ok_or(TransportError::Unreachable(gateway))?;
        packet.tags.app = None;
        packet.tags.socket = Some(socket);
        delivery.deliver_client(packet);
        Ok(())
    }

    /// Drops a client connection and reports it to its gateway.
    pub fn close_client(&self, socket: SocketKey) {
        let Some((_, client)) = self.clients.remove(&socket) else {
            return;
        };
        if let Some(delivery) = self.delivery(client.gateway) {
            delivery.deliver_client(
                Packet::empty(MsgId::NetworkDisconnect).with_tags(RoutingTags::default().socket(socket)),
            );
        }
        debug!("🔌 Client {} closed", socket);
    }

    /// Takes a node off the network: its peers learn about it and its clients are cut.
    pub fn disconnect_node(&self, key: AppKey) -> bool {
        let Some((_, slot)) = self.nodes.remove(&key) else {
            return false;
        };
        self.endpoints.remove(&slot.endpoint);

        let peers: Vec<AppKey> = {
            let mut links = self.links.lock();
            let peers = links
                .iter()
                .filter_map(|&(a, b)| match (a == key, b == key) {
                    (true, _) => Some(b),
                    (_, true) => Some(a),
                    _ => None,
                })
                .collect::<BTreeSet<_>>();
            links.retain(|&(a, b)| a != key && b != key);
            peers.into_iter().collect()
        };
        for peer in peers {
            if let Some(delivery) = self.delivery(peer) {
                delivery.deliver(Packet::empty(MsgId::NetworkDisconnect).with_tags(RoutingTags::default().app(key)));
            }
        }

        let orphans: Vec<SocketKey> = self
            .clients
            .iter()
            .filter(|client| client.gateway == key)
            .map(|client| *client.key())
            .collect();
        for socket in orphans {
            self.clients.remove(&socket);
        }
        warn!("💥 {} dropped off the network", key);
        true
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Client side of a connection accepted by a gateway node.
pub struct ClientHandle {
    socket: SocketKey,
    network: Arc<MemoryNetwork>,
    inbox: Receiver<Packet>,
}

impl ClientHandle {
    pub fn socket(&self) -> SocketKey {
        self.socket
    }

    pub fn send(&self, packet: Packet) -> Result<(), TransportError> {
        self.network.client_send(self.socket, packet)
    }

    pub fn try_recv(&self) -> Option<Packet> {
        match self.inbox.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything received so far.
    pub fn drain(&self) -> Vec<Packet> {
        self.inbox.try_iter().collect()
    }

    /// True once the connection was closed by either side.
    pub fn is_closed(&self) -> bool {
        !self.network.clients.contains_key(&self.socket)
    }

    pub fn close(&self) {
        self.network.close_client(self.socket);
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle").field("socket", &self.socket).finish()
    }
}
