//! # Waypoint Cluster
//!
//! The process roles of a Waypoint cluster, built on the shard runtime.
//!
//! ## Roles
//!
//! * **App manager** ([`appmgr`]) - the single authority over world creation. It keeps
//!   one creation in flight per public world and remembers the dungeon instances
//! * **Game** ([`game`]) - client sessions. Players log in to the [`Lobby`], then live
//!   inside [`WorldProxy`] instances that relay their traffic to the hosting space
//! * **Space** ([`space`]) - the authoritative [`World`] instances and their load
//!   reports
//! * **DB** ([`db`]) - player records behind a [`PlayerStore`]
//!
//! ## Message Flow
//!
//! 1. A client sends `LoginGame`; the lobby binds its socket and asks the db for the
//!    player record
//! 2. The lobby picks the player's last world and, if no proxy for it exists here,
//!    asks the app manager for it (at most one request per world)
//! 3. The app manager picks the least loaded space, which creates the world and
//!    announces it to the game processes
//! 4. Each game process spawns a proxy; the proxy's announcement releases the
//!    waiting players, who are teleported into it
//!
//! Teleports between worlds follow the same path, tracked by a two-flag state machine
//! with a deadline (see [`TeleportTracker`]).
//!
//! ## Deployment
//!
//! A [`Cluster`] assembles every process of a [`Topology`] inside one OS process on a
//! [`MemoryNetwork`]. `AllInOne` runs all roles in a single node; `Split` runs one
//! node per role instance.

pub mod appmgr;
pub mod cluster;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod game;
pub mod network;
pub mod node;
pub mod player;
pub mod proto;
pub mod space;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use appmgr::{CreateWorldRegistry, RegistryInit};
pub use cluster::{endpoint_of, layout, Cluster};
pub use config::{ClusterSettings, Topology};
pub use console::{parse_command, ConsoleSink};
pub use db::{MemoryPlayerStore, PlayerArchive, PlayerStore};
pub use error::ClusterError;
pub use game::{Lobby, SpaceDirectory, TeleportTracker, WorldProxy, WorldProxyFactory};
pub use network::{ClientHandle, MemoryNetwork};
pub use node::{LocalDelivery, Node, NodeEnv};
pub use player::{Player, PlayerCollection, PlayerRecord};
pub use space::{World, WorldGather, WorldOperator};
