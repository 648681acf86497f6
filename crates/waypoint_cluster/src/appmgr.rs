//! # App manager role
//!
//! The [`CreateWorldRegistry`] is the single authority over world creation:
//!
//! - `creating`: public worlds with a creation in flight, the space asked to host them
//!   and when. A request older than the creation timeout is stale and is sent again
//! - `created`: public worlds that exist, by world id
//! - `dungeons`: dungeon instances that exist, by world serial number
//!
//! It also keeps the load table of space processes fed by `AppInfoSync`, used to pick
//! the least loaded host.

use crate::proto::{BroadcastCreateWorld, CreateWorld, QueryWorld, QueryWorldRs, RequestWorld};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, error, info, warn};
use waypoint_runtime::{
    AppId, AppInfo, AppRegistry, AppType, Component, HandlerResult, MsgId, Packet, RoutingTags, ShardContext, Sn, WorldId, WorldKind,
};

pub struct RegistryInit {
    pub creation_timeout_ms: u64,
}

/// A creation request in flight.
#[derive(Debug, Clone, Copy)]
struct Creating {
    space: AppId,
    since_ms: u64,
}

/// World creation authority of the cluster. One per app manager process.
pub struct CreateWorldRegistry {
    apps: AppRegistry,
    creation_timeout_ms: u64,
    creating: BTreeMap<WorldId, Creating>,
    created: BTreeMap<WorldId, Sn>,
    dungeons: BTreeMap<Sn, WorldId>,
}

impl Component for CreateWorldRegistry {
    type Init = RegistryInit;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: RegistryInit) -> Self {
        ctx.on::<Self>(sn, MsgId::AppInfoSync, Self::handle_app_info);
        ctx.on::<Self>(sn, MsgId::RequestWorld, Self::handle_request_world);
        ctx.on::<Self>(sn, MsgId::QueryWorld, Self::handle_query_world);
        ctx.on::<Self>(sn, MsgId::BroadcastCreateWorld, Self::handle_world_created);
        ctx.on::<Self>(sn, MsgId::NetworkDisconnect, Self::handle_disconnect);
        ctx.on::<Self>(sn, MsgId::CmdCreate, Self::handle_cmd_create);
        ctx.on::<Self>(sn, MsgId::CmdApp, Self::handle_cmd_app);
        Self {
            apps: AppRegistry::new(),
            creation_timeout_ms: init.creation_timeout_ms,
            creating: BTreeMap::new(),
            created: BTreeMap::new(),
            dungeons: BTreeMap::new(),
        }
    }
}

impl CreateWorldRegistry {
    pub fn is_creating(&self, world_id: WorldId) -> bool {
        self.creating.contains_key(&world_id)
    }

    pub fn created(&self, world_id: WorldId) -> Option<Sn> {
        self.created.get(&world_id).copied()
    }

    pub fn dungeon(&self, world_sn: Sn) -> Option<WorldId> {
        self.dungeons.get(&world_sn).copied()
    }

    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    fn handle_app_info(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let info: AppInfo = packet.decode()?;
        if info.app_type.intersects(AppType::SPACE) {
            self.apps.apply_sync(info);
        }
        Ok(())
    }

    fn handle_request_world(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let request: RequestWorld = packet.decode()?;
        let world_id = request.world_id;
        if ctx.catalog().kind_of(world_id) != Some(WorldKind::Public) {
            error!("🔴 RequestWorld for {} which is not a public world", world_id);
            return Ok(());
        }

        if let Some(creating) = self.creating.get(&world_id).copied() {
            if ctx.now_ms().saturating_sub(creating.since_ms) < self.creation_timeout_ms {
                debug!("⏳ World {} is already being created", world_id);
                return Ok(());
            }
            warn!(
                "⏰ Creation of world {} on space {} timed out, asking again",
                world_id, creating.space
            );
            self.creating.remove(&world_id);
        }

        if let Some(world_sn) = self.created.get(&world_id) {
            let created = BroadcastCreateWorld {
                world_id,
                world_sn: *world_sn,
                last_world_sn: Sn::NULL,
            };
            ctx.reply(packet, Packet::new(MsgId::BroadcastCreateWorld, &created)?);
            return Ok(());
        }

        self.request_creation(ctx, world_id)
    }

    /// Asks the least loaded space to create `world_id` and records the request.
    fn request_creation(&mut self, ctx: &mut ShardContext, world_id: WorldId) -> HandlerResult {
        let Some(space) = self.apps.pick_least_loaded(AppType::SPACE) else {
            error!("🔴 Cannot create world {}: no space process", world_id);
            return Ok(());
        };

        let create = CreateWorld {
            world_id,
            last_world_sn: Sn::NULL,
            game_app_id: None,
        };
        if ctx.send_to_app(AppType::SPACE, Some(space.app_id), Packet::new(MsgId::CreateWorld, &create)?) {
            info!("🌍 Creating world {} on {}", world_id, space.key());
            self.creating.insert(
                world_id,
                Creating {
                    space: space.app_id,
                    since_ms: ctx.now_ms(),
                },
            );
        }
        Ok(())
    }

    fn handle_query_world(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let query: QueryWorld = packet.decode()?;
        let answer = match self.dungeons.get(&query.world_sn) {
            Some(world_id) => Packet::new(
                MsgId::BroadcastCreateWorld,
                &BroadcastCreateWorld {
                    world_id: *world_id,
                    world_sn: query.world_sn,
                    last_world_sn: query.last_world_sn,
                },
            )?,
            None => Packet::new(
                MsgId::QueryWorldRs,
                &QueryWorldRs {
                    world_id: query.world_id,
                    world_sn: query.world_sn,
                    exists: false,
                },
            )?
            .with_tags(RoutingTags::default().entity(query.last_world_sn)),
        };
        ctx.reply(packet, answer);
        Ok(())
    }

    fn handle_world_created(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let created: BroadcastCreateWorld = packet.decode()?;
        match ctx.catalog().kind_of(created.world_id) {
            Some(WorldKind::Public) => {
                self.creating.remove(&created.world_id);
                self.created.insert(created.world_id, created.world_sn);
                info!("🌍 World {} is up as {}", created.world_id, created.world_sn);
            }
            Some(WorldKind::Dungeon) => {
                self.dungeons.insert(created.world_sn, created.world_id);
                info!("🏰 Dungeon {} is up as {}", created.world_id, created.world_sn);
            }
            _ => error!("🔴 Creation broadcast for unknown world {}", created.world_id),
        }
        Ok(())
    }

    /// A lost space takes its worlds with it; creations it was asked for move elsewhere.
    fn handle_disconnect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        if packet.tags.socket.is_some() {
            return Ok(());
        }
        let Some(key) = packet.tags.app else {
            return Ok(());
        };
        self.apps.remove(key);
        if !key.app_type.intersects(AppType::SPACE) {
            return Ok(());
        }

        let lost = key.app_id;
        let before = self.created.len() + self.dungeons.len();
        self.created.retain(|_, sn| sn.app_id() != lost);
        self.dungeons.retain(|sn, _| sn.app_id() != lost);
        let purged = before - self.created.len() - self.dungeons.len();
        warn!("⚠️ Space {} lost, {} worlds purged", key, purged);

        let stranded: Vec<WorldId> = self
            .creating
            .iter()
            .filter(|(_, creating)| creating.space == lost)
            .map(|(world_id, _)| *world_id)
            .collect();
        for world_id in stranded {
            self.creating.remove(&world_id);
            self.request_creation(ctx, world_id)?;
        }
        Ok(())
    }

    /// Text dump of the creation registry.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "public worlds: {}", self.created.len());
        for (world_id, sn) in &self.created {
            let _ = writeln!(out, "  world {} -> {}", world_id, sn);
        }
        let _ = writeln!(out, "dungeons: {}", self.dungeons.len());
        for (sn, world_id) in &self.dungeons {
            let _ = writeln!(out, "  dungeon {} -> {}", world_id, sn);
        }
        let _ = write!(out, "creating: {}", self.creating.len());
        out
    }

    fn handle_cmd_create(&mut self, _ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        info!("🗂️ Creation registry\n{}", self.dump());
        Ok(())
    }

    fn handle_cmd_app(&mut self, _ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        info!("🗂️ Space processes\n{}", self.apps.dump());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog, TestShard};
    use waypoint_runtime::{AppKey, Destination};

    const CREATION_TIMEOUT_MS: u64 = 5_000;

    fn space_info(app_id: AppId, online: u32) -> AppInfo {
        AppInfo {
            app_type: AppType::SPACE,
            app_id,
            ip: String::new(),
            port: 0,
            online,
        }
    }

    fn registry_shard() -> (TestShard, Sn) {
        let mut test = TestShard::new(AppType::APP_MANAGER, 1);
        let sn = test
            .shard
            .spawn::<CreateWorldRegistry>(RegistryInit {
                creation_timeout_ms: CREATION_TIMEOUT_MS,
            })
            .unwrap();
        for (id, online) in [(3, 5), (4, 1)] {
            test.push(Packet::new(MsgId::AppInfoSync, &space_info(id, online)).unwrap());
        }
        test.shard.tick();
        (test, sn)
    }

    fn request_world(from: AppKey, world_id: WorldId) -> Packet {
        Packet::new(MsgId::RequestWorld, &RequestWorld { world_id })
            .unwrap()
            .with_tags(RoutingTags::default().app(from))
    }

    #[test]
    fn one_creation_in_flight_per_world() {
        let (mut test, sn) = registry_shard();
        let game = AppKey::new(AppType::GAME, 7);
        let space4 = AppKey::new(AppType::SPACE, 4);
        test.link(space4);
        test.link(AppKey::new(AppType::SPACE, 3));

        test.push(request_world(game, 2));
        test.push(request_world(game, 2));
        test.shard.tick();

        assert_eq!(test.sent_to(Destination::App(space4)), vec![MsgId::CreateWorld]);
        let registry = test.shard.context().get::<CreateWorldRegistry>(sn).unwrap();
        assert!(registry.is_creating(2));
        assert_eq!(registry.apps().get(space4).map(|i| i.online), Some(2));
    }

    #[test]
    fn created_worlds_are_answered_directly() {
        let (mut test, sn) = registry_shard();
        let game = AppKey::new(AppType::GAME, 7);
        let world_sn = Sn((5 << 26) | (4 << 16) | 1);
        test.push(
            Packet::new(
                MsgId::BroadcastCreateWorld,
                &BroadcastCreateWorld {
                    world_id: 2,
                    world_sn,
                    last_world_sn: Sn::NULL,
                },
            )
            .unwrap(),
        );
        test.push(request_world(game, 2));
        test.push(request_world(game, 10));
        test.shard.tick();

        let answers = test.sent_packets(Destination::App(game));
        assert_eq!(answers.len(), 1);
        let created: BroadcastCreateWorld = answers[0].decode().unwrap();
        assert_eq!(created.world_sn, world_sn);
        let registry = test.shard.context().get::<CreateWorldRegistry>(sn).unwrap();
        assert_eq!(registry.created(2), Some(world_sn));
        assert!(!registry.is_creating(10));
    }

    #[test]
    fn dungeon_queries_answer_existence() {
        let (mut test, _) = registry_shard();
        let game = AppKey::new(AppType::GAME, 7);
        let dungeon_sn = Sn((5 << 26) | (3 << 16) | 9);
        test.push(
            Packet::new(
                MsgId::BroadcastCreateWorld,
                &BroadcastCreateWorld {
                    world_id: 10,
                    world_sn: dungeon_sn,
                    last_world_sn: Sn(77),
                },
            )
            .unwrap(),
        );
        for world_sn in [dungeon_sn, Sn(12345)] {
            test.push(
                Packet::new(
                    MsgId::QueryWorld,
                    &QueryWorld {
                        world_id: 10,
                        world_sn,
                        last_world_sn: Sn(88),
                    },
                )
                .unwrap()
                .with_tags(RoutingTags::default().app(game)),
            );
        }
        test.shard.tick();

        let answers = test.sent_packets(Destination::App(game));
        assert_eq!(answers[0].msg_id, MsgId::BroadcastCreateWorld);
        let found: BroadcastCreateWorld = answers[0].decode().unwrap();
        assert_eq!(found.last_world_sn, Sn(88));
        assert_eq!(answers[1].msg_id, MsgId::QueryWorldRs);
        assert_eq!(answers[1].tags.entity, Some(Sn(88)));
        let missing: QueryWorldRs = answers[1].decode().unwrap();
        assert!(!missing.exists);
    }

    #[test]
    fn lost_space_purges_worlds_and_moves_creations() {
        let (mut test, sn) = registry_shard();
        let space3 = AppKey::new(AppType::SPACE, 3);
        let space4 = AppKey::new(AppType::SPACE, 4);
        test.link(space3);
        test.link(space4);
        let on_space4 = Sn((5 << 26) | (4 << 16) | 1);
        let on_space3 = Sn((5 << 26) | (3 << 16) | 1);
        for (world_id, world_sn) in [(3, on_space4), (10, on_space3)] {
            test.push(
                Packet::new(
                    MsgId::BroadcastCreateWorld,
                    &BroadcastCreateWorld {
                        world_id,
                        world_sn,
                        last_world_sn: Sn(1),
                    },
                )
                .unwrap(),
            );
        }
        // Creation of world 2 lands on space 4 (least loaded).
        test.push(request_world(AppKey::new(AppType::GAME, 7), 2));
        test.shard.tick();
        assert_eq!(test.sent_to(Destination::App(space4)), vec![MsgId::CreateWorld]);

        test.push(Packet::empty(MsgId::NetworkDisconnect).with_tags(RoutingTags::default().app(space4)));
        test.shard.tick();

        let registry = test.shard.context().get::<CreateWorldRegistry>(sn).unwrap();
        assert_eq!(registry.created(3), None);
        assert_eq!(registry.dungeon(on_space3), Some(10));
        assert!(registry.is_creating(2));
        assert!(registry.apps().get(space4).is_none());
        assert_eq!(test.sent_to(Destination::App(space3)), vec![MsgId::CreateWorld]);
    }

    #[test]
    fn stale_creations_are_requested_again() {
        let (mut test, sn) = registry_shard();
        let game = AppKey::new(AppType::GAME, 7);
        let space4 = AppKey::new(AppType::SPACE, 4);
        test.link(space4);
        test.link(AppKey::new(AppType::SPACE, 3));

        test.push(request_world(game, 2));
        test.shard.tick();

        // Still fresh: the retry joins the creation in flight.
        test.clock.advance(CREATION_TIMEOUT_MS - 1);
        test.push(request_world(game, 2));
        test.shard.tick();
        assert_eq!(test.sent_to(Destination::App(space4)), vec![MsgId::CreateWorld]);

        // The space never answered: the next request goes out again.
        test.clock.advance(10 * CREATION_TIMEOUT_MS);
        test.push(request_world(game, 2));
        test.shard.tick();

        let creates = test.sent_to(Destination::App(space4)).len()
            + test.sent_to(Destination::App(AppKey::new(AppType::SPACE, 3))).len();
        assert_eq!(creates, 2);
        let registry = test.shard.context().get::<CreateWorldRegistry>(sn).unwrap();
        assert!(registry.is_creating(2));
    }
}
