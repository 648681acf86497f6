//! # Lobby
//!
//! Players land in the lobby on login, while their record is loaded. The lobby then
//! sends each of them to the last world they were in:
//!
//! 1. the last dungeon instance, if it still exists (asking the app manager when this
//!    process has no proxy for it)
//! 2. otherwise the last public world, asking for its creation when needed
//!
//! Players waiting for the same world share one request: only the first waiter of a
//! key sends it and the answer releases them all.

use super::routing::teleport;
use crate::player::{Player, PlayerCollection, PlayerRecord};
use crate::proto::{
    BroadcastCreateWorldProxy, LoginGame, PlayerState, QueryPlayer, QueryWorld, QueryWorldRs, RequestWorld,
    TeleportAfter, TeleportFailed,
};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};
use waypoint_runtime::{
    AppType, Component, HandlerResult, MsgId, Packet, RuntimeError, ShardContext, Sn, WorldId, WorldKind,
};

pub struct LobbyInit {
    pub creation_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

#[derive(Debug)]
struct WaitingSet {
    world_id: WorldId,
    since_ms: u64,
    players: BTreeSet<Sn>,
}

/// Entry point of the players of one game process.
pub struct Lobby {
    sn: Sn,
    roles_world: Option<WorldId>,
    players: PlayerCollection,
    waiting_world: BTreeMap<WorldId, WaitingSet>,
    waiting_dungeon: BTreeMap<Sn, WaitingSet>,
    creation_timeout_ms: u64,
}

impl Component for Lobby {
    type Init = LobbyInit;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: LobbyInit) -> Self {
        let roles_world = ctx.catalog().roles_world().map(|info| info.id);
        match roles_world {
            Some(world_id) => {
                ctx.directory().worlds.register(world_id, sn, WorldKind::Roles);
            }
            None => error!("🔴 The world catalog has no roles world for the lobby"),
        }

        ctx.on::<Self>(sn, MsgId::LoginGame, Self::handle_login);
        ctx.on::<Self>(sn, MsgId::QueryPlayerRs, Self::handle_player_loaded);
        ctx.on::<Self>(sn, MsgId::QueryWorldRs, Self::handle_query_world_rs);
        ctx.on::<Self>(sn, MsgId::BroadcastCreateWorldProxy, Self::handle_proxy_created);
        ctx.on_filtered::<Self>(sn, MsgId::TeleportAfter, Self::resolve_leaving, Self::handle_teleport_after);
        ctx.on::<Self>(sn, MsgId::NetworkDisconnect, Self::handle_disconnect);
        ctx.on::<Self>(sn, MsgId::TimerLobbySweep, Self::handle_sweep);
        ctx.add_timer(sn, MsgId::TimerLobbySweep, init.sweep_interval_ms, init.sweep_interval_ms, true);

        Self {
            sn,
            roles_world,
            players: PlayerCollection::new(sn),
            waiting_world: BTreeMap::new(),
            waiting_dungeon: BTreeMap::new(),
            creation_timeout_ms: init.creation_timeout_ms,
        }
    }

    fn dispose(&mut self, ctx: &mut ShardContext, sn: Sn) {
        if let Some(world_id) = self.roles_world {
            ctx.directory().worlds.remove(world_id, sn);
        }
    }
}

impl Lobby {
    pub fn players(&self) -> &PlayerCollection {
        &self.players
    }

    pub fn waiting_for_world(&self, world_id: WorldId) -> usize {
        self.waiting_world.get(&world_id).map_or(0, |set| set.players.len())
    }

    pub fn waiting_for_dungeon(&self, world_sn: Sn) -> usize {
        self.waiting_dungeon.get(&world_sn).map_or(0, |set| set.players.len())
    }

    fn handle_login(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let login: LoginGame = packet.decode()?;
        let socket = packet.tags.socket.ok_or(RuntimeError::MissingTag("socket"))?;
        if self.players.contains(login.player_sn) || self.players.by_account(&login.account).is_some() {
            warn!("⚠️ {} is already logged in, closing {}", login.account, socket);
            ctx.close_client(socket);
            return Ok(());
        }

        let player = Player {
            player_sn: login.player_sn,
            account: login.account.clone(),
            socket: Some(socket),
            gateway: None,
            record: PlayerRecord {
                sn: login.player_sn,
                name: login.account.clone(),
                ..PlayerRecord::default()
            },
        };
        if !self.players.add(ctx, player) {
            return Ok(());
        }
        ctx.directory().sockets.bind(socket, self.sn);
        info!("🔑 {} logged in as {}", login.account, login.player_sn);

        let query = QueryPlayer {
            account: login.account,
            player_sn: login.player_sn,
        };
        ctx.send_to_app(AppType::DB, None, Packet::new(MsgId::QueryPlayer, &query)?);
        Ok(())
    }

    fn handle_player_loaded(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let state: PlayerState = packet.decode()?;
        let mut record = state.record;
        record.normalize(ctx.catalog());
        let player_sn = record.sn;
        let Some(player) = self.players.get_mut(ctx, player_sn) else {
            debug!("Player {} left before its record arrived", player_sn);
            return Ok(());
        };
        player.record = record.clone();

        if let Some(dungeon) = record.last_dungeon {
            if ctx.directory().worlds.is_dungeon_instance(dungeon.world_sn) {
                return self.teleport_to(ctx, player_sn, dungeon.world_sn);
            }
            return self.wait_for_dungeon(ctx, player_sn, dungeon.world_id, dungeon.world_sn);
        }
        self.enter_public(ctx, player_sn, record.last_public.world_id)
    }

    fn wait_for_dungeon(&mut self, ctx: &mut ShardContext, player_sn: Sn, world_id: WorldId, world_sn: Sn) -> HandlerResult {
        match self.waiting_dungeon.entry(world_sn) {
            Entry::Occupied(mut set) => {
                set.get_mut().players.insert(player_sn);
            }
            Entry::Vacant(slot) => {
                slot.insert(WaitingSet {
                    world_id,
                    since_ms: ctx.now_ms(),
                    players: BTreeSet::from([player_sn]),
                });
                let query = QueryWorld {
                    world_id,
                    world_sn,
                    last_world_sn: self.sn,
                };
                ctx.send_to_app(AppType::APP_MANAGER, None, Packet::new(MsgId::QueryWorld, &query)?);
            }
        }
        debug!("⏳ Player {} waits for dungeon {}", player_sn, world_sn);
        Ok(())
    }

    fn enter_public(&mut self, ctx: &mut ShardContext, player_sn: Sn, world_id: WorldId) -> HandlerResult {
        if let Some(world_sn) = ctx.directory().worlds.public_world_sn(world_id) {
            return self.teleport_to(ctx, player_sn, world_sn);
        }

        match self.waiting_world.entry(world_id) {
            Entry::Occupied(mut set) => {
                set.get_mut().players.insert(player_sn);
            }
            Entry::Vacant(slot) => {
                slot.insert(WaitingSet {
                    world_id,
                    since_ms: ctx.now_ms(),
                    players: BTreeSet::from([player_sn]),
                });
                ctx.send_to_app(
                    AppType::APP_MANAGER,
                    None,
                    Packet::new(MsgId::RequestWorld, &RequestWorld { world_id })?,
                );
            }
        }
        debug!("⏳ Player {} waits for world {}", player_sn, world_id);
        Ok(())
    }

    fn teleport_to(&self, ctx: &mut ShardContext, player_sn: Sn, world_sn: Sn) -> HandlerResult {
        if let Some(player) = self.players.get(ctx, player_sn).cloned() {
            teleport(ctx, &player, self.sn, world_sn)?;
        }
        Ok(())
    }

    /// The dungeon is gone: its waiters fall back to their public worlds.
    fn handle_query_world_rs(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let answer: QueryWorldRs = packet.decode()?;
        if answer.exists {
            return Ok(());
        }
        let Some(set) = self.waiting_dungeon.remove(&answer.world_sn) else {
            return Ok(());
        };
        info!("🏚️ Dungeon {} is gone, {} players go back", answer.world_sn, set.players.len());
        for player_sn in set.players {
            let public = self.players.get_mut(ctx, player_sn).map(|player| {
                player.record.last_dungeon = None;
                player.record.last_public.world_id
            });
            if let Some(world_id) = public {
                self.enter_public(ctx, player_sn, world_id)?;
            }
        }
        Ok(())
    }

    fn handle_proxy_created(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let created: BroadcastCreateWorldProxy = packet.decode()?;
        let waiters = match ctx.catalog().kind_of(created.world_id) {
            Some(WorldKind::Public) => self.waiting_world.remove(&created.world_id),
            Some(WorldKind::Dungeon) => {
                let waiters = self.waiting_dungeon.remove(&created.world_sn);
                if waiters.is_none() {
                    error!("🔴 Dungeon {} came up for the lobby but nobody waits", created.world_sn);
                }
                waiters
            }
            _ => None,
        };
        if let Some(set) = waiters {
            for player_sn in set.players {
                self.teleport_to(ctx, player_sn, created.world_sn)?;
            }
        }
        Ok(())
    }

    fn resolve_leaving(&self, _ctx: &ShardContext, packet: &Packet) -> Option<Sn> {
        let leaving: TeleportAfter = packet.decode().ok()?;
        self.players.contains(leaving.player_sn).then_some(leaving.player_sn)
    }

    fn handle_teleport_after(&mut self, ctx: &mut ShardContext, player_sn: Sn, _packet: &Packet) -> HandlerResult {
        self.players.remove(ctx, player_sn);
        debug!("Player {} left the lobby", player_sn);
        Ok(())
    }

    fn handle_disconnect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let Some(socket) = packet.tags.socket else {
            return Ok(());
        };
        if let Some(player) = self.players.remove_by_socket(ctx, socket) {
            for set in self.waiting_world.values_mut().chain(self.waiting_dungeon.values_mut()) {
                set.players.remove(&player.player_sn);
            }
            info!("👋 {} left from the lobby", player.account);
        }
        Ok(())
    }

    /// Gives up on creations that took too long.
    fn handle_sweep(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        let deadline = ctx.now_ms().saturating_sub(self.creation_timeout_ms);
        let mut expired = Vec::new();
        self.waiting_world.retain(|_, set| {
            let keep = set.since_ms > deadline;
            if !keep {
                expired.push((set.world_id, std::mem::take(&mut set.players)));
            }
            keep
        });
        self.waiting_dungeon.retain(|_, set| {
            let keep = set.since_ms > deadline;
            if !keep {
                expired.push((set.world_id, std::mem::take(&mut set.players)));
            }
            keep
        });

        for (world_id, players) in expired {
            warn!("⏰ World {} did not come up in time for {} players", world_id, players.len());
            for player_sn in players {
                let socket = self.players.get(ctx, player_sn).and_then(|player| player.socket);
                if let Some(socket) = socket {
                    let failed = TeleportFailed {
                        world_id,
                        reason: "world creation timed out".into(),
                    };
                    ctx.send_to_client(socket, Packet::new(MsgId::TeleportFailed, &failed)?);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestShard;
    use waypoint_runtime::{AppKey, Destination, RoutingTags, SocketKey};

    const APPMGR: AppKey = AppKey {
        app_type: AppType::APP_MANAGER,
        app_id: 1,
    };
    const DB: AppKey = AppKey {
        app_type: AppType::DB,
        app_id: 2,
    };

    fn lobby() -> (TestShard, Sn) {
        let mut test = TestShard::new(AppType::GAME, 5);
        test.link(APPMGR);
        test.link(DB);
        let sn = test
            .shard
            .spawn::<Lobby>(LobbyInit {
                creation_timeout_ms: 10_000,
                sweep_interval_ms: 1_000,
            })
            .unwrap();
        (test, sn)
    }

    fn login(test: &TestShard, account: &str, player_sn: u64) {
        test.push(
            Packet::new(
                MsgId::LoginGame,
                &LoginGame {
                    account: account.into(),
                    player_sn: Sn(player_sn),
                },
            )
            .unwrap()
            .with_tags(RoutingTags::default().socket(SocketKey(player_sn))),
        );
    }

    fn loaded(test: &TestShard, player_sn: u64, world_id: WorldId) {
        let record = PlayerRecord {
            sn: Sn(player_sn),
            name: format!("p{}", player_sn),
            last_public: crate::player::LastWorld {
                world_id,
                ..Default::default()
            },
            ..Default::default()
        };
        test.push(
            Packet::new(
                MsgId::QueryPlayerRs,
                &PlayerState {
                    account: format!("p{}", player_sn),
                    record,
                },
            )
            .unwrap(),
        );
    }

    #[test]
    fn login_binds_the_socket_and_loads_the_record() {
        let (mut test, sn) = lobby();
        login(&test, "p1", 1);
        login(&test, "p1", 2);
        test.shard.tick();

        assert_eq!(test.directory.sockets.resolve_owner(SocketKey(1)), Some(sn));
        assert_eq!(test.sent_to(Destination::App(DB)), vec![MsgId::QueryPlayer]);
        assert_eq!(*test.outbound.closed.lock(), vec![SocketKey(2)]);
        assert_eq!(test.directory.worlds.entry(sn).map(|e| e.kind), Some(WorldKind::Roles));
    }

    #[test]
    fn waiters_share_one_world_request() {
        let (mut test, sn) = lobby();
        for player in [1, 2] {
            login(&test, &format!("p{}", player), player);
        }
        test.shard.tick();
        for player in [1, 2] {
            loaded(&test, player, 2);
        }
        test.shard.tick();

        assert_eq!(test.sent_to(Destination::App(APPMGR)), vec![MsgId::RequestWorld]);
        assert_eq!(test.shard.context().get::<Lobby>(sn).unwrap().waiting_for_world(2), 2);

        let world_sn = Sn((9 << 26) | (3 << 16) | 1);
        test.push(
            Packet::new(
                MsgId::BroadcastCreateWorldProxy,
                &BroadcastCreateWorldProxy { world_id: 2, world_sn },
            )
            .unwrap(),
        );
        test.shard.tick();

        let teleports: Vec<Packet> = test
            .outbound
            .dispatched
            .lock()
            .iter()
            .filter(|p| p.msg_id == MsgId::Teleport)
            .cloned()
            .collect();
        assert_eq!(teleports.len(), 2);
        assert!(teleports.iter().all(|p| p.tags.entity == Some(world_sn)));
        assert_eq!(test.shard.context().get::<Lobby>(sn).unwrap().waiting_for_world(2), 0);
    }

    #[test]
    fn expired_waits_notify_the_clients() {
        let (mut test, sn) = lobby();
        login(&test, "p1", 1);
        test.shard.tick();
        loaded(&test, 1, 3);
        test.shard.tick();

        test.clock.advance(10_000);
        test.shard.tick();

        let failed = test.sent_packets(Destination::Client(SocketKey(1)));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].msg_id, MsgId::TeleportFailed);
        let lobby = test.shard.context().get::<Lobby>(sn).unwrap();
        assert_eq!(lobby.waiting_for_world(3), 0);
        assert!(lobby.players().contains(Sn(1)));
    }
}
