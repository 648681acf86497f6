use crate::player::{Player, PlayerCollection};
use crate::proto::{EnterWorld, Move, PlayerRef, PlayerState, SyncPlayer, WorldSyncToGather};
use tracing::{debug, info, warn};
use waypoint_runtime::{
    AppKey, AppType, Component, Destination, HandlerResult, MsgId, Packet, RoutingTags, ShardContext, Sn, WorldId,
    WorldInfo,
};

pub struct WorldInit {
    pub info: WorldInfo,
    pub sync_interval_ms: u64,
}

/// One hosted world instance. Its serial number doubles as the world serial number.
pub struct World {
    sn: Sn,
    info: WorldInfo,
    players: PlayerCollection,
}

impl Component for World {
    type Init = WorldInit;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: WorldInit) -> Self {
        ctx.on::<Self>(sn, MsgId::SyncPlayerToSpace, Self::handle_sync_player);
        ctx.on::<Self>(sn, MsgId::RequestSyncPlayer, Self::handle_request_sync);
        ctx.on::<Self>(sn, MsgId::RemovePlayer, Self::handle_remove_player);
        ctx.on::<Self>(sn, MsgId::Move, Self::handle_move);
        ctx.on::<Self>(sn, MsgId::NetworkDisconnect, Self::handle_disconnect);
        ctx.on::<Self>(sn, MsgId::TimerWorldSync, Self::handle_sync_timer);
        ctx.add_timer(sn, MsgId::TimerWorldSync, init.sync_interval_ms, init.sync_interval_ms, true);
        Self {
            sn,
            info: init.info,
            players: PlayerCollection::new(sn),
        }
    }

    fn dispose(&mut self, _ctx: &mut ShardContext, sn: Sn) {
        info!("🌑 World {} ({}) closed", self.info.id, sn);
    }
}

impl World {
    pub fn world_id(&self) -> WorldId {
        self.info.id
    }

    pub fn players(&self) -> &PlayerCollection {
        &self.players
    }

    fn handle_sync_player(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let sync: SyncPlayer = packet.decode()?;
        let mut record = sync.record;
        record.enter_world(&self.info, self.sn);
        let player_sn = record.sn;
        let position = record.position().unwrap_or(self.info.spawn);
        let gateway = packet.tags.app;

        let player = Player {
            player_sn,
            account: sync.account,
            socket: sync.socket,
            gateway,
            record,
        };
        if !self.players.add(ctx, player) {
            return Ok(());
        }
        info!("🚶 Player {} entered world {} ({})", player_sn, self.info.id, self.sn);

        let notice = EnterWorld {
            world_id: self.info.id,
            world_sn: self.sn,
            position,
        };
        let packet = Packet::new(MsgId::EnterWorldNotice, &notice)?
            .with_tags(RoutingTags::default().entity(self.sn).player(player_sn));
        send_to_gateway(ctx, gateway, packet);
        Ok(())
    }

    fn handle_request_sync(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let request: PlayerRef = packet.decode()?;
        let Some(player) = self.players.get(ctx, request.player_sn) else {
            warn!("⚠️ Sync requested for player {} not in world {}", request.player_sn, self.sn);
            return Ok(());
        };

        let gateway = player.gateway;
        let sync = SyncPlayer {
            account: player.account.clone(),
            socket: player.socket,
            record: player.record.clone(),
        };
        let packet = Packet::new(MsgId::SyncPlayerToGame, &sync)?.with_tags(RoutingTags::default().entity(self.sn));
        send_to_gateway(ctx, gateway, packet);
        Ok(())
    }

    fn handle_remove_player(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let request: PlayerRef = packet.decode()?;
        match self.players.remove(ctx, request.player_sn) {
            Some(_) => debug!("🚪 Player {} left world {}", request.player_sn, self.sn),
            None => warn!("⚠️ RemovePlayer for unknown player {} in {}", request.player_sn, self.sn),
        }
        Ok(())
    }

    fn handle_move(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let request: Move = packet.decode()?;
        if let Some(player) = self.players.get_mut(ctx, request.player_sn) {
            player.record.move_to(request.position);
        }
        Ok(())
    }

    /// Client disconnects arrive relayed with a player tag; app disconnects drop every
    /// player relayed by the lost game process.
    fn handle_disconnect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        if let Some(player_sn) = packet.tags.player {
            self.save_and_remove(ctx, player_sn)?;
            return Ok(());
        }
        if packet.tags.socket.is_some() {
            return Ok(());
        }
        let Some(key) = packet.tags.app else {
            return Ok(());
        };
        if !key.app_type.intersects(AppType::GAME) {
            return Ok(());
        }

        let relayed: Vec<Sn> = self
            .players
            .player_sns()
            .into_iter()
            .filter(|sn| self.players.get(ctx, *sn).is_some_and(|p| p.gateway == Some(key)))
            .collect();
        if !relayed.is_empty() {
            warn!("⚠️ {} lost, dropping {} players from world {}", key, relayed.len(), self.sn);
        }
        for player_sn in relayed {
            self.save_and_remove(ctx, player_sn)?;
        }
        Ok(())
    }

    fn save_and_remove(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> HandlerResult {
        let Some(player) = self.players.get(ctx, player_sn).cloned() else {
            return Ok(());
        };
        let state = PlayerState {
            account: player.account,
            record: player.record,
        };
        ctx.send_to_app(AppType::DB, None, Packet::new(MsgId::SavePlayer, &state)?);
        self.players.remove(ctx, player_sn);
        Ok(())
    }

    fn handle_sync_timer(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        let report = WorldSyncToGather {
            world_sn: self.sn,
            online: self.players.len() as u32,
        };
        ctx.dispatch(Packet::new(MsgId::WorldSyncToGather, &report)?);
        Ok(())
    }
}

/// Sends to the game process relaying for a player, or locally when co-hosted.
fn send_to_gateway(ctx: &ShardContext, gateway: Option<AppKey>, packet: Packet) -> bool {
    match gateway {
        Some(key) => ctx.send(Destination::App(key), packet),
        None => {
            ctx.dispatch(packet);
            true
        }
    }
}
