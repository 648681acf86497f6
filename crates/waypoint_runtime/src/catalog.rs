//! Read-only world metadata.

use crate::types::{Position, WorldId, WorldKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static description of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub id: WorldId,
    pub name: String,
    pub kind: WorldKind,
    #[serde(default)]
    pub spawn: Position,
}

/// Lookup of world metadata by id.
pub trait WorldCatalog: Send + Sync {
    fn world(&self, id: WorldId) -> Option<&WorldInfo>;

    fn worlds(&self) -> Vec<&WorldInfo>;

    /// The character selection world hosted by the lobby.
    fn roles_world(&self) -> Option<&WorldInfo> {
        self.worlds().into_iter().find(|info| info.kind == WorldKind::Roles)
    }

    /// The public world new players start in.
    fn initial_public(&self) -> Option<&WorldInfo> {
        self.worlds().into_iter().find(|info| info.kind == WorldKind::Public)
    }

    fn kind_of(&self, id: WorldId) -> Option<WorldKind> {
        self.world(id).map(|info| info.kind)
    }
}

/// Catalog held in memory, ordered by world id.
#[derive(Debug, Clone, Default)]
pub struct StaticWorldCatalog {
    worlds: BTreeMap<WorldId, WorldInfo>,
}

impl StaticWorldCatalog {
    pub fn new(worlds: impl IntoIterator<Item = WorldInfo>) -> Self {
        Self {
            worlds: worlds.into_iter().map(|info| (info.id, info)).collect(),
        }
    }
}

impl WorldCatalog for StaticWorldCatalog {
    fn world(&self, id: WorldId) -> Option<&WorldInfo> {
        self.worlds.get(&id)
    }

    fn worlds(&self) -> Vec<&WorldInfo> {
        self.worlds.values().collect()
    }
}
