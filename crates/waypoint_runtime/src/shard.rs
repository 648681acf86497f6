//! # Shard
//!
//! A shard is a single-threaded executor owning a [`MessageRouter`], a
//! [`ShardContext`] and the read side of a [`PacketQueue`]. One tick:
//!
//! 1. refreshes the shard clock,
//! 2. swaps the inbound double buffer and dispatches every packet in enqueue order,
//! 3. fires due timers,
//! 4. returns released slots without references to their pools.
//!
//! Router operations queued by handlers are applied after each packet.

use crate::clock::Clock;
use crate::component::Component;
use crate::context::ShardContext;
use crate::entity::PoolReport;
use crate::error::RuntimeError;
use crate::packet::{MsgId, Packet};
use crate::queue::PacketQueue;
use crate::router::{MessageRouter, RouterStats};
use crate::shutdown::ShutdownState;
use crate::types::{AppType, Sn};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Snapshot of a shard's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub name: String,
    pub components: usize,
    pub timers: usize,
    pub pending: usize,
    pub router: RouterStats,
    pub pools: Vec<PoolReport>,
}

/// Single-threaded executor of one role of a process.
pub struct Shard {
    name: String,
    router: MessageRouter,
    ctx: ShardContext,
    inbox: Arc<PacketQueue>,
    read: Vec<Arc<Packet>>,
    clock: Arc<dyn Clock>,
}

impl Shard {
    pub fn new(name: impl Into<String>, ctx: ShardContext, inbox: Arc<PacketQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            router: MessageRouter::new(),
            ctx,
            inbox,
            read: Vec::new(),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AppType {
        self.ctx.role()
    }

    pub fn context(&self) -> &ShardContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ShardContext {
        &mut self.ctx
    }

    pub fn inbox(&self) -> &Arc<PacketQueue> {
        &self.inbox
    }

    /// Runs `f` against the context outside of any handler, then applies the
    /// registrations it queued.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut ShardContext) -> R) -> R {
        self.ctx.set_now(self.clock.now_ms());
        let result = f(&mut self.ctx);
        self.apply_router_ops();
        result
    }

    /// Spawns a root component outside of any handler.
    pub fn spawn<C: Component>(&mut self, init: C::Init) -> Result<Sn, RuntimeError> {
        self.with_context(|ctx| ctx.spawn::<C>(Sn::NULL, Sn::NULL, init))
    }

    /// Runs one tick. Returns the number of packets dispatched.
    pub fn tick(&mut self) -> usize {
        self.ctx.set_now(self.clock.now_ms());
        self.apply_router_ops();

        let mut batch = std::mem::take(&mut self.read);
        self.inbox.swap_into(&mut batch);
        let mut dispatched = batch.len();
        for packet in batch.drain(..) {
            self.dispatch_one(&packet);
        }
        self.read = batch;

        for packet in self.ctx.due_timers() {
            self.dispatch_one(&packet);
            dispatched += 1;
        }

        self.ctx.entities.collect();
        dispatched
    }

    fn dispatch_one(&mut self, packet: &Packet) {
        if packet.msg_id == MsgId::CmdPool {
            self.log_pools();
        }
        self.router.dispatch(&mut self.ctx, packet);
        self.apply_router_ops();
    }

    fn apply_router_ops(&mut self) {
        for op in self.ctx.drain_router_ops() {
            self.router.apply(op);
        }
    }

    fn log_pools(&self) {
        info!("📦 [{}] {} live components", self.name, self.ctx.entities.len());
        for report in self.ctx.entities.stats() {
            info!(
                "📦 [{}] {:<24} total={:<5} in_use={:<5} free={:<5} retired={}",
                self.name,
                report.component,
                report.stats.total,
                report.stats.in_use,
                report.stats.free,
                report.stats.retired
            );
        }
    }

    pub fn stats(&self) -> ShardStats {
        ShardStats {
            name: self.name.clone(),
            components: self.ctx.entities.len(),
            timers: self.ctx.timer_count(),
            pending: self.inbox.len(),
            router: self.router.stats(),
            pools: self.ctx.entities.stats(),
        }
    }

    /// Moves the shard onto its own thread, ticking every `tick` until shutdown.
    ///
    /// After shutdown is initiated the shard keeps draining its queue until it is
    /// empty, then exits.
    pub fn start(mut self, shutdown: ShutdownState, tick: Duration) -> std::io::Result<ShardHandle> {
        let name = self.name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            info!("🧵 Shard {} running", self.name);
            while !shutdown.is_shutdown_initiated() {
                if self.tick() == 0 {
                    thread::sleep(tick);
                }
            }
            let mut drained = 0;
            while !self.inbox.is_empty() {
                drained += self.tick();
            }
            debug!("🧵 Shard {} drained {} packets on shutdown", self.name, drained);
            self.stats()
        })?;
        Ok(ShardHandle { name, handle })
    }
}

/// Handle of a shard running on its own thread.
pub struct ShardHandle {
    name: String,
    handle: JoinHandle<ShardStats>,
}

impl ShardHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the shard thread and returns its final statistics.
    pub fn join(self) -> Option<ShardStats> {
        match self.handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                error!("❌ Shard {} panicked", self.name);
                None
            }
        }
    }
}
