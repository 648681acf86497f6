//! Seams between a shard and the outside world.
//!
//! The runtime never touches sockets: it hands packets to an [`Outbound`]
//! implementation and resolves endpoints through a [`ProcessDiscovery`].

use crate::error::TransportError;
use crate::packet::Packet;
use crate::types::{AppKey, SocketKey};
use std::collections::HashMap;

/// Where an outbound packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Another process of the cluster.
    App(AppKey),
    /// A client connection accepted by this process.
    Client(SocketKey),
}

/// Delivery service of a process.
pub trait Outbound: Send + Sync {
    /// Queues `packet` on every shard of this process.
    fn dispatch_local(&self, packet: Packet);

    /// Sends `packet` to a remote process or a client.
    fn send(&self, to: Destination, packet: Packet) -> Result<(), TransportError>;

    /// Opens a link to the process listening on `endpoint`.
    ///
    /// On success the transport later delivers `NetworkConnect` tagged with the
    /// remote app key.
    fn connect(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Closes a client connection. The transport delivers `NetworkDisconnect` for it.
    fn close_client(&self, socket: SocketKey);
}

/// Resolves a process identity to a reachable endpoint.
pub trait ProcessDiscovery: Send + Sync {
    fn locate(&self, key: AppKey) -> Option<String>;
}

/// Discovery backed by a fixed table, usually filled from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    endpoints: HashMap<AppKey, String>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: AppKey, endpoint: impl Into<String>) {
        self.endpoints.insert(key, endpoint.into());
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl ProcessDiscovery for StaticDiscovery {
    fn locate(&self, key: AppKey) -> Option<String> {
        self.endpoints.get(&key).cloned()
    }
}

impl FromIterator<(AppKey, String)> for StaticDiscovery {
    fn from_iter<I: IntoIterator<Item = (AppKey, String)>>(iter: I) -> Self {
        Self {
            endpoints: iter.into_iter().collect(),
        }
    }
}
