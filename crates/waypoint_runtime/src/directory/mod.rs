//! # Directory Services
//!
//! Process-wide registries shared by all shards of a process:
//!
//! - [`WorldLocator`]: world id / world serial number to registered world instances
//! - [`SocketLocator`]: client socket to the component that owns the session
//! - [`NetworkLocator`]: remote app key to the live link towards that process
//!
//! Each locator guards its state with its own mutex. Locator methods never send or
//! dispatch packets, so no packet leaves a shard while a locator lock is held.

mod network;
mod socket;
mod world;

pub use network::{LinkDirection, NetworkLink, NetworkLocator};
pub use socket::SocketLocator;
pub use world::{WorldEntry, WorldLocator};

use crate::types::AppKey;

/// The three locators of one process.
#[derive(Debug)]
pub struct Directory {
    pub worlds: WorldLocator,
    pub sockets: SocketLocator,
    pub network: NetworkLocator,
}

impl Directory {
    pub fn new(identity: AppKey) -> Self {
        Self {
            worlds: WorldLocator::new(),
            sockets: SocketLocator::new(),
            network: NetworkLocator::new(identity),
        }
    }
}
