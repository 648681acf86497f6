//! # Shard Context
//!
//! Everything a handler may touch while it runs: the shard's entity system and
//! timers, the process identity, the shared directory and world catalog, and the
//! outbound transport. One context per shard, passed explicitly to every handler.
//!
//! ## Handler registration
//!
//! Components register plain functions. The router stores a closure that moves the
//! owning component out of its pool for the duration of the call, so a handler
//! receives `&mut Self` and `&mut ShardContext` at the same time:
//!
//! ```rust
//! use waypoint_runtime::{Component, HandlerResult, MsgId, Packet, ShardContext, Sn};
//!
//! struct Gate;
//!
//! impl Gate {
//!     fn on_connect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
//!         tracing::info!("link up at {}: {:?}", ctx.now_ms(), packet.tags.app);
//!         Ok(())
//!     }
//! }
//!
//! impl Component for Gate {
//!     type Init = ();
//!     fn awake(ctx: &mut ShardContext, sn: Sn, _: ()) -> Self {
//!         ctx.on::<Gate>(sn, MsgId::NetworkConnect, Gate::on_connect);
//!         Gate
//!     }
//! }
//! ```

use crate::catalog::{WorldCatalog, WorldInfo};
use crate::component::Component;
use crate::directory::Directory;
use crate::entity::EntitySystem;
use crate::error::{HandlerResult, PoolError, RuntimeError};
use crate::packet::{MsgId, Packet};
use crate::router::{HandlerFn, RouterOp};
use crate::sn::SnGenerator;
use crate::timer::TimerSet;
use crate::transport::{Destination, Outbound};
use crate::types::{AppId, AppKey, AppType, Sn, SocketKey, WorldId};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Plain handler of a component.
pub type Handler<C> = fn(&mut C, &mut ShardContext, &Packet) -> HandlerResult;

/// Resolves the domain object a filtered handler works on.
pub type Resolver<C> = fn(&C, &ShardContext, &Packet) -> Option<Sn>;

/// Handler receiving the object found by its [`Resolver`].
pub type FilteredHandler<C> = fn(&mut C, &mut ShardContext, Sn, &Packet) -> HandlerResult;

/// Shared services of a process, handed to each of its shards.
#[derive(Clone)]
pub struct ProcessServices {
    pub identity: AppKey,
    pub sn: Arc<SnGenerator>,
    pub outbound: Arc<dyn Outbound>,
    pub directory: Arc<Directory>,
    pub catalog: Arc<dyn WorldCatalog>,
}

/// Per-shard execution context.
pub struct ShardContext {
    role: AppType,
    services: ProcessServices,
    pub entities: EntitySystem,
    timers: TimerSet,
    router_ops: Vec<RouterOp>,
    now_ms: u64,
}

impl ShardContext {
    pub fn new(role: AppType, services: ProcessServices, now_ms: u64) -> Self {
        Self {
            role,
            services,
            entities: EntitySystem::new(),
            timers: TimerSet::new(),
            router_ops: Vec::new(),
            now_ms,
        }
    }

    // ---------------------------------------------------------------------
    // Identity and shared services
    // ---------------------------------------------------------------------

    /// Identity of the process this shard belongs to.
    pub fn identity(&self) -> AppKey {
        self.services.identity
    }

    /// The role this shard runs for.
    pub fn role(&self) -> AppType {
        self.role
    }

    /// True when the process carries every role in `app_type`.
    pub fn hosts(&self, app_type: AppType) -> bool {
        self.services.identity.app_type.contains(app_type)
    }

    pub fn directory(&self) -> &Directory {
        &self.services.directory
    }

    pub fn catalog(&self) -> &dyn WorldCatalog {
        self.services.catalog.as_ref()
    }

    pub fn world_info(&self, world_id: WorldId) -> Option<WorldInfo> {
        self.services.catalog.world(world_id).cloned()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub(crate) fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn generate_sn(&self) -> Sn {
        self.services.sn.generate()
    }

    // ---------------------------------------------------------------------
    // Component lifecycle
    // ---------------------------------------------------------------------

    /// Creates a component of type `C`.
    ///
    /// # Arguments
    ///
    /// * `parent` - Owning component, or [`Sn::NULL`] for a root component
    /// * `sn` - Serial number to use, or [`Sn::NULL`] to generate one
    /// * `init` - Arguments for [`Component::awake`]
    ///
    /// # Returns
    ///
    /// The serial number of the live component, or an error when `sn` is already in use.
    pub fn spawn<C: Component>(&mut self, parent: Sn, sn: Sn, init: C::Init) -> Result<Sn, RuntimeError> {
        let sn = if sn.is_null() { self.generate_sn() } else { sn };
        if self.entities.contains(sn) {
            return Err(PoolError::DuplicateSn(sn).into());
        }

        self.entities.insert_record::<C>(sn, parent, release_typed::<C>);
        let component = C::awake(self, sn, init);
        if let Err(e) = self.entities.pool_mut::<C>().insert(sn, parent, component) {
            self.entities.remove_record(sn);
            return Err(e.into());
        }
        debug!(
            "🧩 {} {} spawned (parent {})",
            crate::entity::short_type_name::<C>(),
            sn,
            parent
        );
        Ok(sn)
    }

    /// Attaches a component of type `C` to `parent`, at most one per type.
    pub fn add_component<C: Component>(&mut self, parent: Sn, init: C::Init) -> Result<Sn, RuntimeError> {
        if let Some(existing) = self.entities.child_of_type::<C>(parent) {
            let component = crate::entity::short_type_name::<C>();
            error!("🔴 {} already has a {} ({})", parent, component, existing);
            return Err(RuntimeError::DuplicateComponent { component, parent });
        }
        self.spawn::<C>(parent, Sn::NULL, init)
    }

    /// Releases a component and, first, all of its children.
    ///
    /// Handlers and timers of the released components are removed. The component's
    /// [`Component::dispose`] runs now, or when its running handler returns if the
    /// component releases itself. Releasing an unknown serial number is logged and
    /// returns `false`.
    pub fn release(&mut self, sn: Sn) -> bool {
        let Some(record) = self.entities.remove_record(sn) else {
            error!("🔴 Release of unknown or already released component {}", sn);
            return false;
        };
        for child in record.children.iter().rev() {
            self.release(*child);
        }
        self.router_ops.push(RouterOp::RemoveOwner(sn));
        self.timers.remove_owner(sn);
        (record.release)(self, sn);
        trace!("♻️ {} {} released", record.type_name, sn);
        true
    }

    pub fn get<C: Component>(&self, sn: Sn) -> Option<&C> {
        self.entities.get::<C>(sn)
    }

    pub fn get_mut<C: Component>(&mut self, sn: Sn) -> Option<&mut C> {
        self.entities.get_mut::<C>(sn)
    }

    /// Runs `f` with the component `sn` moved out of its pool.
    ///
    /// Returns `None` when the component does not exist or is already borrowed.
    pub fn with_component<C: Component, R>(
        &mut self,
        sn: Sn,
        f: impl FnOnce(&mut C, &mut ShardContext) -> R,
    ) -> Option<R> {
        let mut component = self.entities.pool_mut::<C>().take(sn)?;
        let result = f(&mut component, self);
        self.restore(sn, component);
        Some(result)
    }

    fn restore<C: Component>(&mut self, sn: Sn, component: C) {
        match self.entities.pool_mut::<C>().restore(sn, component) {
            Ok(None) => {}
            Ok(Some(mut released)) => released.dispose(self, sn),
            Err(e) => error!("🔴 Failed to restore component {}: {}", sn, e),
        }
    }

    // ---------------------------------------------------------------------
    // Handler registration
    // ---------------------------------------------------------------------

    /// Registers `handler` of component `owner` for `msg_id`.
    pub fn on<C: Component>(&mut self, owner: Sn, msg_id: MsgId, handler: Handler<C>) {
        let wrapped: HandlerFn = Box::new(move |ctx: &mut ShardContext, packet: &Packet| {
            ctx.with_component::<C, _>(owner, |component, ctx| handler(component, ctx, packet))
                .unwrap_or(Ok(()))
        });
        self.router_ops.push(RouterOp::Register {
            msg_id,
            owner,
            handler: wrapped,
        });
    }

    /// Registers a handler that only runs when `resolve` finds its target.
    ///
    /// When the resolver comes back empty the packet is skipped for this registration.
    pub fn on_filtered<C: Component>(
        &mut self,
        owner: Sn,
        msg_id: MsgId,
        resolve: Resolver<C>,
        handler: FilteredHandler<C>,
    ) {
        let wrapped: HandlerFn = Box::new(move |ctx: &mut ShardContext, packet: &Packet| {
            ctx.with_component::<C, _>(owner, |component, ctx| match resolve(component, ctx, packet) {
                Some(target) => handler(component, ctx, target, packet),
                None => {
                    trace!("🔍 {} skipped on {}, nothing resolved", packet.msg_id, owner);
                    Ok(())
                }
            })
            .unwrap_or(Ok(()))
        });
        self.router_ops.push(RouterOp::Register {
            msg_id,
            owner,
            handler: wrapped,
        });
    }

    /// Registers the default handler of `owner`.
    pub fn on_default<C: Component>(&mut self, owner: Sn, handler: Handler<C>) {
        let wrapped: HandlerFn = Box::new(move |ctx: &mut ShardContext, packet: &Packet| {
            ctx.with_component::<C, _>(owner, |component, ctx| handler(component, ctx, packet))
                .unwrap_or(Ok(()))
        });
        self.router_ops.push(RouterOp::RegisterDefault { owner, handler: wrapped });
    }

    pub(crate) fn drain_router_ops(&mut self) -> Vec<RouterOp> {
        std::mem::take(&mut self.router_ops)
    }

    // ---------------------------------------------------------------------
    // Messaging
    // ---------------------------------------------------------------------

    /// Queues `packet` on every shard of this process.
    pub fn dispatch(&self, packet: Packet) {
        self.services.outbound.dispatch_local(packet);
    }

    /// Sends `packet` to a destination, logging delivery failures.
    pub fn send(&self, to: Destination, packet: Packet) -> bool {
        let msg_id = packet.msg_id;
        match self.services.outbound.send(to, packet) {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Failed to send {} to {:?}: {}", msg_id, to, e);
                false
            }
        }
    }

    /// Sends `packet` to one process of `app_type`.
    ///
    /// When this process carries `app_type` (and, if given, has `app_id`) the packet is
    /// dispatched locally. Otherwise it goes to the matching linked process with the
    /// lowest key.
    pub fn send_to_app(&self, app_type: AppType, app_id: Option<AppId>, packet: Packet) -> bool {
        let identity = self.services.identity;
        if identity.app_type.contains(app_type) && app_id.map_or(true, |id| id == identity.app_id) {
            self.dispatch(packet);
            return true;
        }

        let target = self
            .services
            .directory
            .network
            .app_keys(app_type)
            .into_iter()
            .find(|key| app_id.map_or(true, |id| id == key.app_id));
        match target {
            Some(key) => self.send(Destination::App(key), packet),
            None => {
                warn!("⚠️ No route for {} to {} (id {:?})", packet.msg_id, app_type, app_id);
                false
            }
        }
    }

    /// Sends `packet` to every linked process of `app_type`, and locally when this
    /// process carries the type. Returns the number of deliveries.
    pub fn send_to_all(&self, app_type: AppType, packet: Packet) -> usize {
        let mut delivered = 0;
        for key in self.services.directory.network.app_keys(app_type) {
            if self.send(Destination::App(key), packet.clone()) {
                delivered += 1;
            }
        }
        if self.hosts(app_type) {
            self.dispatch(packet);
            delivered += 1;
        }
        delivered
    }

    pub fn send_to_client(&self, socket: SocketKey, packet: Packet) -> bool {
        self.send(Destination::Client(socket), packet)
    }

    /// Answers `request`: to its sending process, else to its client, else locally.
    pub fn reply(&self, request: &Packet, packet: Packet) -> bool {
        if let Some(app) = request.tags.app {
            self.send(Destination::App(app), packet)
        } else if let Some(socket) = request.tags.socket {
            self.send_to_client(socket, packet)
        } else {
            self.dispatch(packet);
            true
        }
    }

    /// Closes a client connection.
    pub fn close_client(&self, socket: SocketKey) {
        self.services.outbound.close_client(socket);
    }

    /// Opens a link to another process.
    pub fn connect(&self, endpoint: &str) -> bool {
        match self.services.outbound.connect(endpoint) {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Connect to {} failed: {}", endpoint, e);
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Schedules `msg_id` for `owner`. The packet carries `owner` as entity tag.
    pub fn add_timer(&mut self, owner: Sn, msg_id: MsgId, delay_ms: u64, interval_ms: u64, repeat: bool) {
        self.timers.add(owner, msg_id, self.now_ms, delay_ms, interval_ms, repeat);
    }

    pub(crate) fn due_timers(&mut self) -> Vec<Packet> {
        self.timers.due(self.now_ms)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }
}

fn release_typed<C: Component>(ctx: &mut ShardContext, sn: Sn) {
    match ctx.entities.pool_mut::<C>().release(sn) {
        Ok(Some(mut component)) => component.dispose(ctx, sn),
        Ok(None) => trace!("⏳ {} is running a handler, dispose deferred", sn),
        Err(e) => error!("🔴 {}", e),
    }
}
