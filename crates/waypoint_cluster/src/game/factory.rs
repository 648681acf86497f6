use super::proxy::{ProxyInit, WorldProxy};
use crate::proto::BroadcastCreateWorld;
use tracing::{error, warn};
use waypoint_runtime::{Component, HandlerResult, MsgId, Packet, ShardContext, Sn, WorldKind};

pub struct FactoryInit {
    pub teleport_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

/// Spawns a world proxy for every world announced to this game process.
pub struct WorldProxyFactory {
    sn: Sn,
    teleport_timeout_ms: u64,
    sweep_interval_ms: u64,
}

impl Component for WorldProxyFactory {
    type Init = FactoryInit;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: FactoryInit) -> Self {
        ctx.on::<Self>(sn, MsgId::BroadcastCreateWorld, Self::handle_world_created);
        Self {
            sn,
            teleport_timeout_ms: init.teleport_timeout_ms,
            sweep_interval_ms: init.sweep_interval_ms,
        }
    }
}

impl WorldProxyFactory {
    /// Serial numbers of the live proxies.
    pub fn proxies<'a>(&self, ctx: &'a ShardContext) -> &'a [Sn] {
        ctx.entities.children(self.sn)
    }

    fn handle_world_created(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let created: BroadcastCreateWorld = packet.decode()?;
        let Some(info) = ctx.world_info(created.world_id) else {
            error!("🔴 Creation broadcast for unknown world {}", created.world_id);
            return Ok(());
        };

        match info.kind {
            WorldKind::Public => {
                if let Some(existing) = ctx.directory().worlds.public_world_sn(info.id) {
                    error!(
                        "🔴 Public world {} announced as {} but {} is already registered",
                        info.id, created.world_sn, existing
                    );
                    return Ok(());
                }
            }
            WorldKind::Dungeon => {
                if !ctx.directory().worlds.contains(created.last_world_sn) {
                    error!(
                        "🔴 Dungeon {} ({}) requested from {} which is not here",
                        info.id, created.world_sn, created.last_world_sn
                    );
                    return Ok(());
                }
            }
            WorldKind::Login | WorldKind::Roles => {
                error!("🔴 World {} is not hosted by spaces", info.id);
                return Ok(());
            }
        }

        if ctx.entities.contains(created.world_sn) {
            warn!("⚠️ Proxy {} already exists", created.world_sn);
            return Ok(());
        }

        let init = ProxyInit {
            info,
            last_world_sn: created.last_world_sn,
            teleport_timeout_ms: self.teleport_timeout_ms,
            sweep_interval_ms: self.sweep_interval_ms,
        };
        ctx.spawn::<WorldProxy>(self.sn, created.world_sn, init)?;
        Ok(())
    }
}
