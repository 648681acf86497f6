use crate::types::{Sn, WorldId, WorldKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

/// A registered world instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorldEntry {
    pub world_id: WorldId,
    pub world_sn: Sn,
    pub kind: WorldKind,
}

#[derive(Debug, Default)]
struct WorldIndex {
    publics: HashMap<WorldId, Sn>,
    instances: BTreeMap<Sn, WorldEntry>,
}

/// Registry of the world instances reachable from this process.
///
/// Public worlds are unique per world id; every other kind is addressed by its
/// serial number only.
#[derive(Debug, Default)]
pub struct WorldLocator {
    inner: Mutex<WorldIndex>,
}

impl WorldLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a world instance.
    ///
    /// A second public world with an already registered id is rejected: the error is
    /// logged, the existing registration is kept and `false` is returned.
    pub fn register(&self, world_id: WorldId, world_sn: Sn, kind: WorldKind) -> bool {
        let mut index = self.inner.lock();
        if kind == WorldKind::Public {
            if let Some(existing) = index.publics.get(&world_id) {
                error!(
                    "🔴 Public world {} is already registered as {}, rejecting {}",
                    world_id, existing, world_sn
                );
                return false;
            }
            index.publics.insert(world_id, world_sn);
        }
        index.instances.insert(
            world_sn,
            WorldEntry {
                world_id,
                world_sn,
                kind,
            },
        );
        debug!("🌍 World {} registered as {} ({:?})", world_id, world_sn, kind);
        true
    }

    /// Removes a world instance. The public slot is only cleared if it still points at `world_sn`.
    pub fn remove(&self, world_id: WorldId, world_sn: Sn) -> bool {
        let mut index = self.inner.lock();
        if index.publics.get(&world_id) == Some(&world_sn) {
            index.publics.remove(&world_id);
        }
        let removed = index.instances.remove(&world_sn).is_some();
        if removed {
            debug!("🌍 World {} ({}) removed from locator", world_id, world_sn);
        }
        removed
    }

    /// True when `world_sn` is a registered dungeon instance.
    pub fn is_dungeon_instance(&self, world_sn: Sn) -> bool {
        self.inner
            .lock()
            .instances
            .get(&world_sn)
            .is_some_and(|entry| entry.kind == WorldKind::Dungeon)
    }

    /// True when `world_sn` is registered, whatever its kind.
    pub fn contains(&self, world_sn: Sn) -> bool {
        self.inner.lock().instances.contains_key(&world_sn)
    }

    pub fn public_world_sn(&self, world_id: WorldId) -> Option<Sn> {
        self.inner.lock().publics.get(&world_id).copied()
    }

    pub fn entry(&self, world_sn: Sn) -> Option<WorldEntry> {
        self.inner.lock().instances.get(&world_sn).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().instances.is_empty()
    }

    /// Copy of every registered instance, ordered by serial number.
    pub fn snapshot(&self) -> Vec<WorldEntry> {
        self.inner.lock().instances.values().copied().collect()
    }
}
