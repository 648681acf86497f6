//! The component contract.

use crate::context::ShardContext;
use crate::types::Sn;

/// A pooled, addressable unit of state owned by one shard.
///
/// Components are built by [`ShardContext::spawn`], which reserves the serial
/// number, records the parent link and calls [`Component::awake`]. Handlers are
/// usually registered from `awake`. [`Component::dispose`] runs when the component
/// is released, after its children have been released and before its slot is
/// returned to the pool.
///
/// # Examples
///
/// ```rust
/// use waypoint_runtime::{Component, MsgId, Packet, ShardContext, Sn, HandlerResult};
///
/// struct Echo {
///     seen: u32,
/// }
///
/// impl Echo {
///     fn handle_move(&mut self, _ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
///         self.seen += 1;
///         Ok(())
///     }
/// }
///
/// impl Component for Echo {
///     type Init = ();
///
///     fn awake(ctx: &mut ShardContext, sn: Sn, _init: ()) -> Self {
///         ctx.on::<Echo>(sn, MsgId::Move, Echo::handle_move);
///         Echo { seen: 0 }
///     }
/// }
/// ```
pub trait Component: Send + Sized + 'static {
    /// Arguments handed to [`Component::awake`].
    type Init;

    /// Singletons get a pool growing one slot at a time.
    const SINGLETON: bool = false;

    /// Builds the component in its initial state.
    fn awake(ctx: &mut ShardContext, sn: Sn, init: Self::Init) -> Self;

    /// Releases resources held outside of the component itself.
    fn dispose(&mut self, _ctx: &mut ShardContext, _sn: Sn) {}
}
