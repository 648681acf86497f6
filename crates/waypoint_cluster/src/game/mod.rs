//! Game process role: client sessions, the lobby and one proxy per known world.

mod directory;
mod factory;
mod lobby;
mod proxy;
mod routing;
mod teleport;

pub use directory::SpaceDirectory;
pub use factory::{FactoryInit, WorldProxyFactory};
pub use lobby::{Lobby, LobbyInit};
pub use proxy::{ProxyInit, WorldProxy};
pub use teleport::{FlagState, TeleportInit, TeleportObject, TeleportOutcome, TeleportTracker};
