//! # Message Router
//!
//! Handlers are keyed by `(MsgId, owner serial number)`, one handler per key, and
//! every owner may additionally register one default handler.
//!
//! ## Dispatch rules
//!
//! 1. A packet with an entity tag only reaches the handlers of that owner.
//! 2. A packet without entity tag reaches every handler registered for its `MsgId`,
//!    in owner serial number order.
//! 3. When no handler ran, the packet has an entity tag and no `to_world` tag, the
//!    default handler of that entity runs instead.
//! 4. Anything else is dropped silently.
//!
//! Registrations coming from handlers are queued on the [`ShardContext`] as
//! [`RouterOp`]s and applied between two packets, so the handler tables never
//! change while a packet is being dispatched.

use crate::context::ShardContext;
use crate::error::HandlerResult;
use crate::packet::{MsgId, Packet};
use crate::types::Sn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, trace, warn};

/// Type-erased message handler.
pub type HandlerFn = Box<dyn FnMut(&mut ShardContext, &Packet) -> HandlerResult + Send>;

/// Deferred change to the handler tables.
pub enum RouterOp {
    Register { msg_id: MsgId, owner: Sn, handler: HandlerFn },
    RegisterDefault { owner: Sn, handler: HandlerFn },
    RemoveOwner(Sn),
}

/// Dispatch counters of one router.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RouterStats {
    /// Registered `(MsgId, owner)` handlers
    pub handlers: usize,
    /// Registered default handlers
    pub default_handlers: usize,
    /// Packets dispatched since start
    pub dispatched: u64,
    /// Packets that fell back to a default handler
    pub default_fallbacks: u64,
    /// Packets no handler consumed
    pub unhandled: u64,
    /// Handler invocations that returned an error
    pub failures: u64,
}

/// Routing table of one shard.
#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<MsgId, BTreeMap<Sn, HandlerFn>>,
    defaults: BTreeMap<Sn, HandlerFn>,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(msg_id, owner)`.
    ///
    /// A second registration for the same key is a programming error: it is logged
    /// and ignored, the first handler stays in place.
    pub fn register(&mut self, msg_id: MsgId, owner: Sn, handler: HandlerFn) -> bool {
        let owners = self.handlers.entry(msg_id).or_default();
        if owners.contains_key(&owner) {
            error!("🔴 Handler for {} already registered on {}", msg_id, owner);
            return false;
        }
        owners.insert(owner, handler);
        self.stats.handlers += 1;
        true
    }

    pub fn register_default(&mut self, owner: Sn, handler: HandlerFn) -> bool {
        if self.defaults.contains_key(&owner) {
            error!("🔴 Default handler already registered on {}", owner);
            return false;
        }
        self.defaults.insert(owner, handler);
        self.stats.default_handlers += 1;
        true
    }

    /// Drops every handler and the default handler of `owner`.
    pub fn remove_owner(&mut self, owner: Sn) -> usize {
        let mut removed = 0;
        self.handlers.retain(|_, owners| {
            if owners.remove(&owner).is_some() {
                removed += 1;
            }
            !owners.is_empty()
        });
        self.stats.handlers -= removed;
        if self.defaults.remove(&owner).is_some() {
            self.stats.default_handlers -= 1;
            removed += 1;
        }
        removed
    }

    pub fn apply(&mut self, op: RouterOp) {
        match op {
            RouterOp::Register { msg_id, owner, handler } => {
                self.register(msg_id, owner, handler);
            }
            RouterOp::RegisterDefault { owner, handler } => {
                self.register_default(owner, handler);
            }
            RouterOp::RemoveOwner(owner) => {
                let removed = self.remove_owner(owner);
                trace!("🧹 Removed {} handlers of {}", removed, owner);
            }
        }
    }

    pub fn has_handler(&self, msg_id: MsgId, owner: Sn) -> bool {
        self.handlers
            .get(&msg_id)
            .is_some_and(|owners| owners.contains_key(&owner))
    }

    /// Dispatches one packet. Returns whether any handler consumed it.
    pub fn dispatch(&mut self, ctx: &mut ShardContext, packet: &Packet) -> bool {
        self.stats.dispatched += 1;
        let mut handled = false;

        if let Some(owners) = self.handlers.get_mut(&packet.msg_id) {
            match packet.tags.entity {
                Some(owner) => {
                    if let Some(handler) = owners.get_mut(&owner) {
                        handled = true;
                        invoke(&mut self.stats, handler, ctx, packet, owner);
                    }
                }
                None => {
                    for (owner, handler) in owners.iter_mut() {
                        handled = true;
                        invoke(&mut self.stats, handler, ctx, packet, *owner);
                    }
                }
            }
        }

        if !handled && packet.tags.to_world.is_none() {
            if let Some(owner) = packet.tags.entity {
                if let Some(handler) = self.defaults.get_mut(&owner) {
                    handled = true;
                    self.stats.default_fallbacks += 1;
                    invoke(&mut self.stats, handler, ctx, packet, owner);
                }
            }
        }

        if !handled {
            self.stats.unhandled += 1;
            trace!("📭 {} dropped, no handler (entity {:?})", packet.msg_id, packet.tags.entity);
        }
        handled
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.clone()
    }
}

fn invoke(stats: &mut RouterStats, handler: &mut HandlerFn, ctx: &mut ShardContext, packet: &Packet, owner: Sn) {
    if let Err(e) = handler(ctx, packet) {
        stats.failures += 1;
        warn!("⚠️ Handler for {} on {} failed: {}", packet.msg_id, owner, e);
    }
}
