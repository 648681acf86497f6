//! # Component Pool
//!
//! Slab of component slots with a free list and a serial-number index. Slots are
//! never shrunk: when the free list runs dry the pool grows by a fixed batch.
//!
//! ## Slot lifecycle
//!
//! ```text
//! Free ──insert──▶ Live ──take──▶ Taken ──restore──▶ Live
//!                   │               │
//!                release         release (deferred until restore)
//!                   ▼               ▼
//!                Retired ◀──────────┘
//!                   │
//!                collect (refs == 0)
//!                   ▼
//!                 Free (sn = 0)
//! ```
//!
//! A retired slot keeps its serial number in the index until it is collected, so a
//! second release of the same serial number is detected instead of corrupting a
//! slot that has been handed to somebody else.

use crate::error::PoolError;
use crate::types::Sn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default number of slots added when a pool runs out of free slots.
pub const DEFAULT_BATCH: usize = 50;

enum SlotState<C> {
    Free,
    Live(C),
    Taken { released: bool },
    Retired,
}

struct Slot<C> {
    sn: Sn,
    parent: Sn,
    refs: u32,
    state: SlotState<C>,
}

impl<C> Slot<C> {
    fn free() -> Self {
        Self {
            sn: Sn::NULL,
            parent: Sn::NULL,
            refs: 0,
            state: SlotState::Free,
        }
    }
}

/// Slot counters of one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub free: usize,
    pub in_use: usize,
    pub retired: usize,
}

/// Typed pool of components addressed by serial number.
pub struct Pool<C> {
    slots: Vec<Slot<C>>,
    free: Vec<usize>,
    retired: Vec<usize>,
    index: HashMap<Sn, usize>,
    batch: usize,
}

impl<C> Pool<C> {
    /// Creates an empty pool growing by `batch` slots at a time.
    pub fn new(batch: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            retired: Vec::new(),
            index: HashMap::new(),
            batch: batch.max(1),
        }
    }

    fn grow(&mut self) {
        let start = self.slots.len();
        self.slots.extend((0..self.batch).map(|_| Slot::free()));
        self.free.extend((start..start + self.batch).rev());
    }

    /// Stores a freshly constructed component under `sn`.
    pub fn insert(&mut self, sn: Sn, parent: Sn, component: C) -> Result<(), PoolError> {
        if sn.is_null() {
            return Err(PoolError::InvalidState(sn));
        }
        if self.index.contains_key(&sn) {
            return Err(PoolError::DuplicateSn(sn));
        }
        if self.free.is_empty() {
            self.grow();
        }
        let idx = self.free.pop().ok_or(PoolError::InvalidState(sn))?;
        self.slots[idx] = Slot {
            sn,
            parent,
            refs: 0,
            state: SlotState::Live(component),
        };
        self.index.insert(sn, idx);
        Ok(())
    }

    fn slot(&self, sn: Sn) -> Option<&Slot<C>> {
        self.index.get(&sn).map(|idx| &self.slots[*idx])
    }

    fn slot_mut(&mut self, sn: Sn) -> Option<&mut Slot<C>> {
        match self.index.get(&sn) {
            Some(idx) => Some(&mut self.slots[*idx]),
            None => None,
        }
    }

    pub fn get(&self, sn: Sn) -> Option<&C> {
        match self.slot(sn).map(|slot| &slot.state) {
            Some(SlotState::Live(component)) => Some(component),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, sn: Sn) -> Option<&mut C> {
        match self.slot_mut(sn).map(|slot| &mut slot.state) {
            Some(SlotState::Live(component)) => Some(component),
            _ => None,
        }
    }

    /// True while the component is live or taken by a running handler.
    pub fn contains(&self, sn: Sn) -> bool {
        matches!(
            self.slot(sn).map(|slot| &slot.state),
            Some(SlotState::Live(_)) | Some(SlotState::Taken { released: false })
        )
    }

    pub fn parent(&self, sn: Sn) -> Option<Sn> {
        self.slot(sn).map(|slot| slot.parent)
    }

    /// Moves the component out of its slot for the duration of a handler call.
    ///
    /// The slot holds a reference while taken, so it cannot be collected.
    pub fn take(&mut self, sn: Sn) -> Option<C> {
        let slot = self.slot_mut(sn)?;
        if !matches!(slot.state, SlotState::Live(_)) {
            return None;
        }
        slot.refs += 1;
        match std::mem::replace(&mut slot.state, SlotState::Taken { released: false }) {
            SlotState::Live(component) => Some(component),
            _ => None,
        }
    }

    /// Puts a taken component back.
    ///
    /// Returns the component when it was released while taken: the caller must
    /// dispose of it, the slot is already retired.
    pub fn restore(&mut self, sn: Sn, component: C) -> Result<Option<C>, PoolError> {
        let idx = *self.index.get(&sn).ok_or(PoolError::UnknownSn(sn))?;
        let slot = &mut self.slots[idx];
        let released = match slot.state {
            SlotState::Taken { released } => released,
            _ => return Err(PoolError::InvalidState(sn)),
        };
        slot.refs = slot.refs.saturating_sub(1);
        if released {
            slot.state = SlotState::Retired;
            self.retired.push(idx);
            Ok(Some(component))
        } else {
            slot.state = SlotState::Live(component);
            Ok(None)
        }
    }

    /// Starts releasing `sn`.
    ///
    /// Returns the component for disposal, or `None` when it is taken and will be
    /// handed back by [`Pool::restore`].
    pub fn release(&mut self, sn: Sn) -> Result<Option<C>, PoolError> {
        let idx = *self.index.get(&sn).ok_or(PoolError::UnknownSn(sn))?;
        let slot = &mut self.slots[idx];
        match slot.state {
            SlotState::Taken { released: false } => {
                slot.state = SlotState::Taken { released: true };
                Ok(None)
            }
            SlotState::Taken { released: true } | SlotState::Retired => Err(PoolError::DoubleRelease(sn)),
            SlotState::Free => Err(PoolError::UnknownSn(sn)),
            SlotState::Live(_) => match std::mem::replace(&mut slot.state, SlotState::Retired) {
                SlotState::Live(component) => {
                    self.retired.push(idx);
                    Ok(Some(component))
                }
                _ => Err(PoolError::InvalidState(sn)),
            },
        }
    }

    /// Pins the slot of `sn` so it is not reused while the reference is held.
    pub fn add_ref(&mut self, sn: Sn) -> bool {
        match self.slot_mut(sn) {
            Some(slot) => {
                slot.refs += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove_ref(&mut self, sn: Sn) -> bool {
        match self.slot_mut(sn) {
            Some(slot) if slot.refs > 0 => {
                slot.refs -= 1;
                true
            }
            _ => false,
        }
    }

    /// Returns retired slots without references to the free list.
    pub fn collect(&mut self) -> usize {
        let mut collected = 0;
        let slots = &mut self.slots;
        let index = &mut self.index;
        let free = &mut self.free;
        self.retired.retain(|idx| {
            let slot = &mut slots[*idx];
            if slot.refs > 0 {
                return true;
            }
            index.remove(&slot.sn);
            *slot = Slot::free();
            free.push(*idx);
            collected += 1;
            false
        });
        collected
    }

    /// Iterates live components.
    pub fn iter(&self) -> impl Iterator<Item = (Sn, &C)> {
        self.slots.iter().filter_map(|slot| match &slot.state {
            SlotState::Live(component) => Some((slot.sn, component)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len() - self.retired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.slots.len(),
            free: self.free.len(),
            in_use: self.len(),
            retired: self.retired.len(),
        }
    }
}
