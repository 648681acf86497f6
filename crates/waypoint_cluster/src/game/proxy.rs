//! # World proxy
//!
//! The game-side stand-in of a world hosted by a space process. It shares the world's
//! serial number, holds the client sessions of the players inside and relays traffic
//! both ways:
//!
//! - client to world: packets from a bound socket go to the hosting space, tagged with
//!   the player and the world
//! - world to client: packets carrying a player tag go to that player's socket
//!
//! Transfers to other worlds start here and are tracked by a [`TeleportTracker`].

use super::routing::{send_to_world, teleport};
use super::teleport::{TeleportOutcome, TeleportTracker};
use crate::player::{Player, PlayerCollection};
use crate::proto::{
    BroadcastCreateWorldProxy, EnterWorld, PlayerRef, PlayerState, SyncPlayer, Teleport, TeleportAfter, TeleportFailed,
};
use tracing::{debug, error, info, warn};
use waypoint_runtime::{
    AppType, Component, HandlerResult, MsgId, Packet, RoutingTags, ShardContext, Sn, WorldId, WorldInfo,
};

pub struct ProxyInit {
    pub info: WorldInfo,
    /// World the creation was requested from, told when the proxy is up.
    pub last_world_sn: Sn,
    pub teleport_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

pub struct WorldProxy {
    sn: Sn,
    info: WorldInfo,
    players: PlayerCollection,
    teleports: TeleportTracker,
}

impl Component for WorldProxy {
    type Init = ProxyInit;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: ProxyInit) -> Self {
        ctx.directory().worlds.register(init.info.id, sn, init.info.kind);

        ctx.on::<Self>(sn, MsgId::NetworkDisconnect, Self::handle_disconnect);
        ctx.on::<Self>(sn, MsgId::Teleport, Self::handle_teleport);
        ctx.on_filtered::<Self>(sn, MsgId::TeleportAfter, Self::resolve_leaving, Self::handle_teleport_after);
        ctx.on::<Self>(sn, MsgId::EnterWorld, Self::handle_enter_world);
        ctx.on::<Self>(sn, MsgId::SyncPlayerToGame, Self::handle_player_synced);
        ctx.on::<Self>(sn, MsgId::BroadcastCreateWorldProxy, Self::handle_proxy_created);
        ctx.on::<Self>(sn, MsgId::TimerTeleportSweep, Self::handle_sweep);
        ctx.on_default::<Self>(sn, Self::relay);
        ctx.add_timer(sn, MsgId::TimerTeleportSweep, init.sweep_interval_ms, init.sweep_interval_ms, true);

        let announce = BroadcastCreateWorldProxy {
            world_id: init.info.id,
            world_sn: sn,
        };
        match Packet::new(MsgId::BroadcastCreateWorldProxy, &announce) {
            Ok(packet) => ctx.dispatch(packet.with_tags(RoutingTags::default().entity(init.last_world_sn))),
            Err(e) => error!("🔴 Proxy {} could not announce itself: {}", sn, e),
        }
        info!("🪞 Proxy of world {} up as {}", init.info.id, sn);

        Self {
            sn,
            info: init.info,
            players: PlayerCollection::new(sn),
            teleports: TeleportTracker::new(sn, init.teleport_timeout_ms),
        }
    }

    fn dispose(&mut self, ctx: &mut ShardContext, sn: Sn) {
        ctx.directory().worlds.remove(self.info.id, sn);
        info!("🪞 Proxy of world {} ({}) gone", self.info.id, sn);
    }
}

impl WorldProxy {
    pub fn world_id(&self) -> WorldId {
        self.info.id
    }

    pub fn players(&self) -> &PlayerCollection {
        &self.players
    }

    pub fn teleports(&self) -> &TeleportTracker {
        &self.teleports
    }

    fn handle_disconnect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        if let Some(socket) = packet.tags.socket {
            let Some(player) = self.players.remove_by_socket(ctx, socket) else {
                return Ok(());
            };
            self.teleports.cancel(ctx, player.player_sn);
            info!("👋 Player {} left world {} ({})", player.player_sn, self.info.id, socket);
            let relay = Packet::empty(MsgId::NetworkDisconnect).with_tags(RoutingTags::default().account(player.account));
            send_to_world(ctx, self.sn, player.player_sn, relay);
            return Ok(());
        }

        let Some(key) = packet.tags.app else {
            return Ok(());
        };
        if !key.app_type.intersects(AppType::SPACE) || key.app_id != self.sn.app_id() {
            return Ok(());
        }

        warn!("⚠️ Host {} of world {} ({}) lost", key, self.info.id, self.sn);
        for player in self.players.remove_all(ctx) {
            let state = PlayerState {
                account: player.account.clone(),
                record: player.record.clone(),
            };
            ctx.send_to_app(AppType::DB, None, Packet::new(MsgId::SavePlayer, &state)?);
            if let Some(socket) = player.socket {
                ctx.close_client(socket);
            }
        }
        ctx.release(self.sn);
        Ok(())
    }

    /// Adopts a player handed over by another world or the lobby.
    fn handle_teleport(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let handover: Teleport = packet.decode()?;
        let mut record = handover.record;
        record.enter_world(&self.info, self.sn);
        let player_sn = record.sn;

        let player = Player {
            player_sn,
            account: handover.account.clone(),
            socket: Some(handover.socket),
            gateway: None,
            record: record.clone(),
        };
        if !self.players.add(ctx, player) {
            return Ok(());
        }

        let sync = SyncPlayer {
            account: handover.account,
            socket: Some(handover.socket),
            record,
        };
        send_to_world(ctx, self.sn, player_sn, Packet::new(MsgId::SyncPlayerToSpace, &sync)?);
        ctx.dispatch(
            Packet::new(MsgId::TeleportAfter, &TeleportAfter { player_sn })?
                .with_tags(RoutingTags::default().entity(handover.last_world_sn)),
        );
        ctx.directory().sockets.bind(handover.socket, self.sn);
        debug!("🌀 Player {} arrived in {}", player_sn, self.sn);
        Ok(())
    }

    fn resolve_leaving(&self, _ctx: &ShardContext, packet: &Packet) -> Option<Sn> {
        let leaving: TeleportAfter = packet.decode().ok()?;
        self.players.contains(leaving.player_sn).then_some(leaving.player_sn)
    }

    fn handle_teleport_after(&mut self, ctx: &mut ShardContext, player_sn: Sn, _packet: &Packet) -> HandlerResult {
        self.players.remove(ctx, player_sn);
        send_to_world(ctx, self.sn, player_sn, Packet::new(MsgId::RemovePlayer, &PlayerRef { player_sn })?);
        Ok(())
    }

    fn handle_enter_world(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let request: EnterWorld = packet.decode()?;
        let Some(player_sn) = packet.tags.socket.and_then(|socket| self.players.by_socket(socket)) else {
            warn!("⚠️ EnterWorld from a client not in world {}", self.sn);
            return Ok(());
        };
        if request.world_id == self.info.id {
            debug!("Player {} is already in world {}", player_sn, request.world_id);
            return Ok(());
        }
        let Some(target) = ctx.world_info(request.world_id) else {
            error!("🔴 Player {} asked for unknown world {}", player_sn, request.world_id);
            return Ok(());
        };
        let Some(player) = self.players.get(ctx, player_sn).cloned() else {
            return Ok(());
        };

        if self.teleports.begin(ctx, &player, &target)? {
            self.try_complete(ctx, player_sn)?;
        }
        Ok(())
    }

    fn handle_player_synced(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let sync: SyncPlayer = packet.decode()?;
        let player_sn = sync.record.sn;
        if let Some(player) = self.players.get_mut(ctx, player_sn) {
            player.record = sync.record;
        }
        if self.teleports.on_player_synced(ctx, player_sn) {
            self.try_complete(ctx, player_sn)?;
        }
        Ok(())
    }

    fn handle_proxy_created(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let created: BroadcastCreateWorldProxy = packet.decode()?;
        if created.world_sn == self.sn || self.teleports.is_empty() {
            return Ok(());
        }
        let Some(info) = ctx.world_info(created.world_id) else {
            return Ok(());
        };
        for player_sn in self.teleports.on_world_ready(ctx, &info, created.world_sn) {
            self.try_complete(ctx, player_sn)?;
        }
        Ok(())
    }

    fn try_complete(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> HandlerResult {
        match self.teleports.check(ctx, player_sn) {
            TeleportOutcome::Pending => Ok(()),
            TeleportOutcome::Ready { world_id, world_sn } => {
                if !ctx.directory().worlds.contains(world_sn) {
                    warn!(
                        "⚠️ World {} ({}) is gone, player {} stays in {}",
                        world_id, world_sn, player_sn, self.sn
                    );
                    return self.notify_failed(ctx, player_sn, world_id, "world is gone");
                }
                if let Some(player) = self.players.get(ctx, player_sn).cloned() {
                    teleport(ctx, &player, self.sn, world_sn)?;
                }
                Ok(())
            }
            TeleportOutcome::Aborted { world_id } => self.notify_failed(ctx, player_sn, world_id, "aborted"),
        }
    }

    fn handle_sweep(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        for (player_sn, world_id) in self.teleports.sweep(ctx) {
            self.notify_failed(ctx, player_sn, world_id, "timed out")?;
        }
        Ok(())
    }

    /// Tells the client of `player_sn` its transfer to `world_id` did not happen.
    fn notify_failed(&self, ctx: &ShardContext, player_sn: Sn, world_id: WorldId, reason: &str) -> HandlerResult {
        let Some(socket) = self.players.get(ctx, player_sn).and_then(|player| player.socket) else {
            return Ok(());
        };
        let failed = TeleportFailed {
            world_id,
            reason: reason.into(),
        };
        ctx.send_to_client(socket, Packet::new(MsgId::TeleportFailed, &failed)?);
        Ok(())
    }

    /// Relays whatever no handler consumed between the clients and the world.
    fn relay(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        if let Some(socket) = packet.tags.socket {
            let Some(player_sn) = self.players.by_socket(socket) else {
                debug!("Dropping {} from unknown client {}", packet.msg_id, socket);
                return Ok(());
            };
            let mut forward = packet.clone();
            forward.tags.socket = None;
            send_to_world(ctx, self.sn, player_sn, forward);
        } else if let Some(player_sn) = packet.tags.player {
            match self.players.get(ctx, player_sn).and_then(|player| player.socket) {
                Some(socket) => {
                    ctx.send_to_client(socket, packet.clone());
                }
                None => debug!("Dropping {} for player {} not in {}", packet.msg_id, player_sn, self.sn),
            }
        }
        Ok(())
    }
}
