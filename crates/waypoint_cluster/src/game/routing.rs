//! Routing helpers shared by the lobby and the world proxies.

use crate::player::Player;
use crate::proto::Teleport;
use tracing::{debug, error};
use waypoint_runtime::{AppType, MsgId, Packet, PacketError, RoutingTags, ShardContext, Sn};

/// Sends `packet` to the space process hosting `world_sn`, tagged for that world.
///
/// The creating app id is carried by the serial number, so no lookup is needed.
pub(crate) fn send_to_world(ctx: &ShardContext, world_sn: Sn, player_sn: Sn, packet: Packet) -> bool {
    let mut tags = packet.tags.clone();
    tags.entity = Some(world_sn);
    tags.to_world = Some(world_sn);
    tags.player = (!player_sn.is_null()).then_some(player_sn);
    ctx.send_to_app(AppType::SPACE, Some(world_sn.app_id()), packet.with_tags(tags))
}

/// Hands `player` over to the proxy of `target`.
///
/// The target adopts the session and answers the previous owner `last_world_sn`
/// with `TeleportAfter`.
pub(crate) fn teleport(ctx: &ShardContext, player: &Player, last_world_sn: Sn, target: Sn) -> Result<(), PacketError> {
    let Some(socket) = player.socket else {
        error!("🔴 Player {} has no client connection to move", player.player_sn);
        return Ok(());
    };
    let handover = Teleport {
        last_world_sn,
        account: player.account.clone(),
        socket,
        record: player.record.clone(),
    };
    debug!("🌀 Teleporting {} from {} to {}", player.player_sn, last_world_sn, target);
    ctx.dispatch(Packet::new(MsgId::Teleport, &handover)?.with_tags(RoutingTags::default().entity(target)));
    Ok(())
}
