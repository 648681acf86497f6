//! Type-indexed component storage of a shard.
//!
//! One [`Pool`] per component type, looked up by `TypeId`, plus a record per live
//! serial number holding the parent/child links. Parents refer to children by
//! serial number only, so releasing a subtree is a walk over the records.

use crate::component::Component;
use crate::context::ShardContext;
use crate::pool::{Pool, PoolStats, DEFAULT_BATCH};
use crate::types::Sn;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;

pub(crate) trait ErasedPool: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
    fn collect(&mut self) -> usize;
    fn stats(&self) -> PoolStats;
}

struct TypedPool<C> {
    type_name: &'static str,
    pool: Pool<C>,
}

impl<C: Component> ErasedPool for TypedPool<C> {
    fn as_any(&self) -> &dyn Any {
        &self.pool
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.pool
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn collect(&mut self) -> usize {
        self.pool.collect()
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

pub(crate) type ReleaseFn = fn(&mut ShardContext, Sn);

/// Bookkeeping of one live component.
pub(crate) struct Record {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) parent: Sn,
    pub(crate) children: Vec<Sn>,
    pub(crate) release: ReleaseFn,
}

/// Pool statistics of one component type.
#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub component: &'static str,
    #[serde(flatten)]
    pub stats: PoolStats,
}

/// All pools and component records of a shard.
#[derive(Default)]
pub struct EntitySystem {
    pools: HashMap<TypeId, Box<dyn ErasedPool>>,
    records: HashMap<Sn, Record>,
}

impl EntitySystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool of `C`, if any component of that type was ever spawned.
    pub fn pool<C: Component>(&self) -> Option<&Pool<C>> {
        self.pools
            .get(&TypeId::of::<C>())
            .and_then(|pool| pool.as_any().downcast_ref::<Pool<C>>())
    }

    pub(crate) fn pool_mut<C: Component>(&mut self) -> &mut Pool<C> {
        let erased = self.pools.entry(TypeId::of::<C>()).or_insert_with(|| {
            let batch = if C::SINGLETON { 1 } else { DEFAULT_BATCH };
            Box::new(TypedPool::<C> {
                type_name: short_type_name::<C>(),
                pool: Pool::new(batch),
            })
        });
        match erased.as_any_mut().downcast_mut::<Pool<C>>() {
            Some(pool) => pool,
            None => unreachable!("pool registered under a foreign TypeId"),
        }
    }

    pub fn get<C: Component>(&self, sn: Sn) -> Option<&C> {
        self.pool::<C>().and_then(|pool| pool.get(sn))
    }

    pub fn get_mut<C: Component>(&mut self, sn: Sn) -> Option<&mut C> {
        self.existing_pool_mut::<C>().and_then(|pool| pool.get_mut(sn))
    }

    fn existing_pool_mut<C: Component>(&mut self) -> Option<&mut Pool<C>> {
        self.pools
            .get_mut(&TypeId::of::<C>())
            .and_then(|pool| pool.as_any_mut().downcast_mut::<Pool<C>>())
    }

    /// Iterates every live component of type `C`.
    pub fn iter<C: Component>(&self) -> impl Iterator<Item = (Sn, &C)> {
        self.pool::<C>().into_iter().flat_map(|pool| pool.iter())
    }

    /// Serial number of the first live component of type `C`.
    pub fn first<C: Component>(&self) -> Option<Sn> {
        self.iter::<C>().next().map(|(sn, _)| sn)
    }

    /// True while `sn` names a live component of any type.
    pub fn contains(&self, sn: Sn) -> bool {
        self.records.contains_key(&sn)
    }

    pub fn is<C: Component>(&self, sn: Sn) -> bool {
        self.records
            .get(&sn)
            .is_some_and(|record| record.type_id == TypeId::of::<C>())
    }

    pub fn type_name_of(&self, sn: Sn) -> Option<&'static str> {
        self.records.get(&sn).map(|record| record.type_name)
    }

    pub fn parent(&self, sn: Sn) -> Option<Sn> {
        self.records
            .get(&sn)
            .map(|record| record.parent)
            .filter(|parent| !parent.is_null())
    }

    pub fn children(&self, sn: Sn) -> &[Sn] {
        self.records
            .get(&sn)
            .map(|record| record.children.as_slice())
            .unwrap_or(&[])
    }

    /// First child of `parent` whose type is `C`.
    pub fn child_of_type<C: Component>(&self, parent: Sn) -> Option<Sn> {
        self.children(parent).iter().copied().find(|child| self.is::<C>(*child))
    }

    /// Pins the slot of the live `C` component `sn` against reuse.
    ///
    /// A pinned slot survives the release of its component: [`EntitySystem::collect`]
    /// skips it until every pin is dropped, so `sn` never names a newer component.
    pub fn add_ref<C: Component>(&mut self, sn: Sn) -> bool {
        if !self.is::<C>(sn) {
            return false;
        }
        self.existing_pool_mut::<C>().is_some_and(|pool| pool.add_ref(sn))
    }

    /// Drops a pin taken with [`EntitySystem::add_ref`]. Works after release too.
    pub fn remove_ref<C: Component>(&mut self, sn: Sn) -> bool {
        self.existing_pool_mut::<C>().is_some_and(|pool| pool.remove_ref(sn))
    }

    /// Number of live components across all pools.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns retired slots of every pool to their free lists.
    pub fn collect(&mut self) -> usize {
        self.pools.values_mut().map(|pool| pool.collect()).sum()
    }

    /// Per-type pool statistics, sorted by component name.
    pub fn stats(&self) -> Vec<PoolReport> {
        let mut reports: Vec<PoolReport> = self
            .pools
            .values()
            .map(|pool| PoolReport {
                component: pool.type_name(),
                stats: pool.stats(),
            })
            .collect();
        reports.sort_by(|a, b| a.component.cmp(b.component));
        reports
    }

    pub(crate) fn insert_record<C: Component>(&mut self, sn: Sn, parent: Sn, release: ReleaseFn) {
        self.records.insert(
            sn,
            Record {
                type_id: TypeId::of::<C>(),
                type_name: short_type_name::<C>(),
                parent,
                children: Vec::new(),
                release,
            },
        );
        if !parent.is_null() {
            if let Some(parent_record) = self.records.get_mut(&parent) {
                parent_record.children.push(sn);
            }
        }
    }

    pub(crate) fn remove_record(&mut self, sn: Sn) -> Option<Record> {
        let record = self.records.remove(&sn)?;
        if let Some(parent_record) = self.records.get_mut(&record.parent) {
            parent_record.children.retain(|child| *child != sn);
        }
        Some(record)
    }
}

/// Type name without its module path.
pub(crate) fn short_type_name<C>() -> &'static str {
    let full = std::any::type_name::<C>();
    full.rsplit("::").next().unwrap_or(full)
}
