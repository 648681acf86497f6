//! # Waypoint Runtime
//!
//! Single-threaded shard runtime for the processes of a Waypoint cluster.
//!
//! ## Core Features
//!
//! - **Serial numbers**: process-unique, time-ordered ids that reveal their creating app
//! - **Pooled components**: typed pools with free lists, parent/child records and
//!   deferred slot reuse
//! - **Message routing**: per-owner handlers, filtered handlers and default fallbacks
//! - **Double-buffered queues**: lock-light cross-thread delivery with per-owner ordering
//! - **Directories**: world, socket and network locators shared by the shards of a process
//! - **Load-aware selection**: least-online choice among registered processes
//!
//! ## Architecture Overview
//!
//! A process runs one [`Shard`] per role it carries. A shard owns a [`ShardContext`]
//! (entities, timers, shared services) and a [`MessageRouter`]. Handlers never share
//! component state across shards: everything crossing a shard boundary is a [`Packet`]
//! pushed onto a [`PacketQueue`] through the process [`Outbound`].
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waypoint_runtime::*;
//!
//! struct Quiet;
//! impl Outbound for Quiet {
//!     fn dispatch_local(&self, _packet: Packet) {}
//!     fn send(&self, _to: Destination, _packet: Packet) -> Result<(), TransportError> { Ok(()) }
//!     fn connect(&self, _endpoint: &str) -> Result<(), TransportError> { Ok(()) }
//!     fn close_client(&self, _socket: SocketKey) {}
//! }
//!
//! let identity = AppKey::new(AppType::SPACE, 1);
//! let services = ProcessServices {
//!     identity,
//!     sn: Arc::new(SnGenerator::new(identity.app_id).unwrap()),
//!     outbound: Arc::new(Quiet),
//!     directory: Arc::new(Directory::new(identity)),
//!     catalog: Arc::new(StaticWorldCatalog::default()),
//! };
//! let ctx = ShardContext::new(AppType::SPACE, services, clock::now_ms());
//! let mut shard = Shard::new("space", ctx, Arc::new(PacketQueue::new()), Arc::new(SystemClock));
//! shard.tick();
//! ```

pub mod catalog;
pub mod clock;
pub mod component;
pub mod context;
pub mod directory;
pub mod entity;
pub mod error;
pub mod link;
pub mod packet;
pub mod pool;
pub mod queue;
pub mod router;
pub mod shard;
pub mod shutdown;
pub mod sn;
pub mod sync;
pub mod timer;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use catalog::{StaticWorldCatalog, WorldCatalog, WorldInfo};
pub use clock::{Clock, ManualClock, SystemClock};
pub use component::Component;
pub use context::{ProcessServices, ShardContext};
pub use directory::{Directory, LinkDirection, NetworkLink, NetworkLocator, SocketLocator, WorldEntry, WorldLocator};
pub use entity::{EntitySystem, PoolReport};
pub use error::{HandlerResult, PacketError, PoolError, RuntimeError, TransportError};
pub use link::{AppRegister, LinkAgent, LinkAgentInit, LinkUp};
pub use packet::{MsgId, Packet, Payload, RoutingTags};
pub use pool::{Pool, PoolStats};
pub use queue::PacketQueue;
pub use router::{MessageRouter, RouterStats};
pub use shard::{Shard, ShardHandle, ShardStats};
pub use shutdown::ShutdownState;
pub use sn::SnGenerator;
pub use sync::{AppInfo, AppRegistry};
pub use transport::{Destination, Outbound, ProcessDiscovery, StaticDiscovery};
pub use types::{AppId, AppKey, AppType, Position, Sn, SocketKey, WorldId, WorldKind};
