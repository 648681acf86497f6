use super::world::{World, WorldInit};
use crate::proto::{BroadcastCreateWorld, CreateWorld};
use tracing::{error, info};
use waypoint_runtime::{
    AppType, Component, Destination, HandlerResult, MsgId, Packet, ShardContext, Sn, WorldId, WorldKind,
};

pub struct OperatorInit {
    pub world_sync_interval_ms: u64,
}

/// Creates worlds in this space process. One per space process.
pub struct WorldOperator {
    sn: Sn,
    world_sync_interval_ms: u64,
}

impl Component for WorldOperator {
    type Init = OperatorInit;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: OperatorInit) -> Self {
        ctx.on::<Self>(sn, MsgId::CreateWorld, Self::handle_create_world);
        Self {
            sn,
            world_sync_interval_ms: init.world_sync_interval_ms,
        }
    }
}

impl WorldOperator {
    /// Serial numbers and world ids of the hosted worlds.
    pub fn worlds(&self, ctx: &ShardContext) -> Vec<(Sn, WorldId)> {
        ctx.entities
            .children(self.sn)
            .iter()
            .filter_map(|sn| ctx.get::<World>(*sn).map(|world| (*sn, world.world_id())))
            .collect()
    }

    fn handle_create_world(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let request: CreateWorld = packet.decode()?;
        let Some(info) = ctx.world_info(request.world_id) else {
            error!("🔴 CreateWorld for unknown world {}", request.world_id);
            return Ok(());
        };
        if !matches!(info.kind, WorldKind::Public | WorldKind::Dungeon) {
            error!("🔴 World {} is a {:?} world and is never hosted by a space", info.id, info.kind);
            return Ok(());
        }
        if info.kind == WorldKind::Dungeon && request.last_world_sn.is_null() {
            error!("🔴 Dungeon {} created without the world the player comes from", info.id);
        }

        let world_sn = ctx.spawn::<World>(
            self.sn,
            Sn::NULL,
            WorldInit {
                info,
                sync_interval_ms: self.world_sync_interval_ms,
            },
        )?;
        info!("🌍 World {} created as {}", request.world_id, world_sn);

        let created = BroadcastCreateWorld {
            world_id: request.world_id,
            world_sn,
            last_world_sn: request.last_world_sn,
        };
        announce_world(ctx, &Packet::new(MsgId::BroadcastCreateWorld, &created)?, &request);
        Ok(())
    }
}

/// Fans a creation broadcast out to the processes that track worlds.
///
/// The app manager gets it unless it lives here. Game processes get it unless this
/// process is one: the requesting game when known, otherwise all of them. A local
/// app manager or game receives it through local dispatch.
fn announce_world(ctx: &ShardContext, created: &Packet, request: &CreateWorld) {
    if !ctx.hosts(AppType::APP_MANAGER) {
        ctx.send_to_app(AppType::APP_MANAGER, None, created.clone());
    }

    if !ctx.hosts(AppType::GAME) {
        match request.game_app_id {
            Some(game_id) => {
                ctx.send_to_app(AppType::GAME, Some(game_id), created.clone());
            }
            None => {
                for key in ctx.directory().network.app_keys(AppType::GAME) {
                    ctx.send(Destination::App(key), created.clone());
                }
            }
        }
    }

    if ctx.hosts(AppType::APP_MANAGER) || ctx.hosts(AppType::GAME) {
        ctx.dispatch(created.clone());
    }
}
