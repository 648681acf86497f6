// End-to-end scenarios on an in-process cluster.
#[cfg(test)]
mod tests {
    use crate::player::LastWorld;
    use crate::proto::{EnterWorld, LoginGame, TeleportFailed};
    use crate::testing::catalog;
    use crate::*;
    use std::sync::Arc;
    use tracing::debug;
    use waypoint_runtime::{AppKey, AppType, ManualClock, MsgId, Packet, Sn, WorldId};

    const IDLE_ROUNDS: usize = 200;

    fn build(topology: Topology) -> (Cluster, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let settings = ClusterSettings {
            topology,
            ..ClusterSettings::default()
        };
        let mut cluster = Cluster::build(&settings, Arc::new(catalog()), Arc::new(clock.clone())).unwrap();
        let rounds = cluster.run_until_idle(IDLE_ROUNDS);
        debug!("Cluster settled after {} rounds", rounds);
        (cluster, clock)
    }

    fn login(cluster: &Cluster, gateway: AppKey, account: &str, player_sn: u64) -> ClientHandle {
        let client = cluster.open_client(gateway).unwrap();
        let login = LoginGame {
            account: account.into(),
            player_sn: Sn(player_sn),
        };
        client.send(Packet::new(MsgId::LoginGame, &login).unwrap()).unwrap();
        client
    }

    fn entered(packets: &[Packet]) -> Vec<EnterWorld> {
        packets
            .iter()
            .filter(|packet| packet.msg_id == MsgId::EnterWorldNotice)
            .map(|packet| packet.decode().unwrap())
            .collect()
    }

    fn enter_world(client: &ClientHandle, world_id: WorldId) {
        let request = EnterWorld {
            world_id,
            world_sn: Sn::NULL,
            position: Default::default(),
        };
        client.send(Packet::new(MsgId::EnterWorld, &request).unwrap()).unwrap();
    }

    /// Proxies of `world_id` on a game node.
    fn proxies_of(node: &Node, world_id: WorldId) -> Vec<Sn> {
        node.shard(AppType::GAME)
            .unwrap()
            .context()
            .entities
            .iter::<WorldProxy>()
            .filter(|(_, proxy)| proxy.world_id() == world_id)
            .map(|(sn, _)| sn)
            .collect()
    }

    fn world_players(node: &Node, world_sn: Sn) -> usize {
        node.shard(AppType::SPACE)
            .unwrap()
            .context()
            .get::<World>(world_sn)
            .map_or(0, |world| world.players().len())
    }

    fn store_record(player_sn: u64, public: WorldId, dungeon: Option<(WorldId, Sn)>) -> PlayerRecord {
        PlayerRecord {
            sn: Sn(player_sn),
            name: format!("player-{}", player_sn),
            last_public: LastWorld {
                world_id: public,
                ..Default::default()
            },
            last_dungeon: dungeon.map(|(world_id, world_sn)| LastWorld {
                world_id,
                world_sn,
                ..Default::default()
            }),
            current_world: 0,
        }
    }

    #[test]
    fn test_first_login_creates_the_public_world_once() {
        let (mut cluster, _) = build(Topology::AllInOne);
        let node_key = AppKey::new(AppType::ALL_IN_ONE, 1);
        let ada = login(&cluster, node_key, "ada", 101);
        let bob = login(&cluster, node_key, "bob", 102);
        cluster.run_until_idle(IDLE_ROUNDS);

        let node = cluster.node(node_key).unwrap();
        let proxies = proxies_of(node, 2);
        assert_eq!(proxies.len(), 1);
        let world_sn = proxies[0];

        for client in [&ada, &bob] {
            let notices = entered(&client.drain());
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].world_id, 2);
            assert_eq!(notices[0].world_sn, world_sn);
            assert_eq!(node.directory().sockets.resolve_owner(client.socket()), Some(world_sn));
        }

        let (_, _, registry) = node.component::<CreateWorldRegistry>().unwrap();
        assert_eq!(registry.created(2), Some(world_sn));
        assert!(!registry.is_creating(2));
        let (_, _, lobby) = node.component::<Lobby>().unwrap();
        assert!(lobby.players().is_empty());
        assert_eq!(world_players(node, world_sn), 2);
        assert_eq!(cluster.store().len(), 2);
    }

    #[test]
    fn test_teleport_between_public_worlds_completes_once() {
        let (mut cluster, _) = build(Topology::AllInOne);
        let node_key = AppKey::new(AppType::ALL_IN_ONE, 1);
        let ada = login(&cluster, node_key, "ada", 101);
        cluster.run_until_idle(IDLE_ROUNDS);
        let from = proxies_of(cluster.node(node_key).unwrap(), 2)[0];
        ada.drain();

        enter_world(&ada, 3);
        cluster.run_until_idle(IDLE_ROUNDS);

        let node = cluster.node(node_key).unwrap();
        let to = proxies_of(node, 3)[0];
        let notices = entered(&ada.drain());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].world_sn, to);

        let shard = node.shard(AppType::GAME).unwrap().context();
        let old = shard.get::<WorldProxy>(from).unwrap();
        let new = shard.get::<WorldProxy>(to).unwrap();
        assert!(old.players().is_empty());
        assert!(old.teleports().is_empty());
        assert!(new.players().contains(Sn(101)));
        assert_eq!(world_players(node, from), 0);
        assert_eq!(world_players(node, to), 1);
        assert_eq!(node.directory().sockets.resolve_owner(ada.socket()), Some(to));
    }

    #[test]
    fn test_teleport_times_out_when_nothing_answers() {
        let (mut cluster, clock) = build(Topology::AllInOne);
        let node_key = AppKey::new(AppType::ALL_IN_ONE, 1);
        let ada = login(&cluster, node_key, "ada", 101);
        cluster.run_until_idle(IDLE_ROUNDS);
        let from = proxies_of(cluster.node(node_key).unwrap(), 2)[0];
        ada.drain();

        // Only the game shard runs: the world is never created and the sync never comes.
        enter_world(&ada, 3);
        let node = cluster.node_mut(node_key).unwrap();
        node.shard_mut(AppType::GAME).unwrap().tick();
        {
            let proxy = node.shard(AppType::GAME).unwrap().context().get::<WorldProxy>(from).unwrap();
            assert!(proxy.teleports().is_teleporting(Sn(101)));
        }

        clock.advance(ClusterSettings::default().teleport_timeout_ms);
        node.shard_mut(AppType::GAME).unwrap().tick();

        let failures: Vec<TeleportFailed> = ada
            .drain()
            .iter()
            .filter(|packet| packet.msg_id == MsgId::TeleportFailed)
            .map(|packet| packet.decode().unwrap())
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].world_id, 3);
        let proxy = node.shard(AppType::GAME).unwrap().context().get::<WorldProxy>(from).unwrap();
        assert!(proxy.teleports().is_empty());
        assert!(proxy.players().contains(Sn(101)));
    }

    #[test]
    fn test_players_queued_on_a_dungeon_share_one_query() {
        let (mut cluster, _) = build(Topology::Split { spaces: 2, games: 2 });
        let appmgr = AppKey::new(AppType::APP_MANAGER, 1);
        let db = AppKey::new(AppType::DB, 2);
        let games = cluster.keys_of(AppType::GAME);
        let (g1, g2) = (games[0], games[1]);

        // A player on the first game opens a dungeon instance.
        let ada = login(&cluster, g1, "ada", 101);
        cluster.run_until_idle(IDLE_ROUNDS);
        enter_world(&ada, 10);
        cluster.run_until_idle(IDLE_ROUNDS);
        let dungeon = proxies_of(cluster.node(g1).unwrap(), 10)[0];
        assert_eq!(entered(&ada.drain()).last().map(|n| n.world_sn), Some(dungeon));

        // Two players last seen in that dungeon log in on the second game.
        for player_sn in [201, 202] {
            cluster.store().insert(store_record(player_sn, 2, Some((10, dungeon))));
        }
        let bob = login(&cluster, g2, "bob", 201);
        let cy = login(&cluster, g2, "cy", 202);

        cluster.node_mut(g2).unwrap().tick();
        cluster.node_mut(db).unwrap().tick();
        cluster.node_mut(g2).unwrap().tick();
        assert_eq!(cluster.node(appmgr).unwrap().pending(), 1);
        let (_, _, lobby) = cluster.node(g2).unwrap().component::<Lobby>().unwrap();
        assert_eq!(lobby.waiting_for_dungeon(dungeon), 2);

        cluster.run_until_idle(IDLE_ROUNDS);
        assert_eq!(proxies_of(cluster.node(g2).unwrap(), 10), vec![dungeon]);
        for client in [&bob, &cy] {
            let notices = entered(&client.drain());
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].world_id, 10);
            assert_eq!(notices[0].world_sn, dungeon);
        }
        let host = cluster
            .keys_of(AppType::SPACE)
            .into_iter()
            .find(|key| key.app_id == dungeon.app_id())
            .unwrap();
        assert_eq!(world_players(cluster.node(host).unwrap(), dungeon), 3);
    }

    #[test]
    fn test_unknown_dungeon_falls_back_to_the_public_world() {
        let (mut cluster, _) = build(Topology::Split { spaces: 1, games: 1 });
        let game = cluster.keys_of(AppType::GAME)[0];
        let gone = Sn((1 << 26) | (3 << 16) | 42);
        cluster.store().insert(store_record(301, 3, Some((10, gone))));

        let dee = login(&cluster, game, "dee", 301);
        cluster.run_until_idle(IDLE_ROUNDS);

        let notices = entered(&dee.drain());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].world_id, 3);
        let (_, _, lobby) = cluster.node(game).unwrap().component::<Lobby>().unwrap();
        assert_eq!(lobby.waiting_for_dungeon(gone), 0);
        assert!(lobby.players().is_empty());
    }

    #[test]
    fn test_lost_space_saves_players_and_forgets_its_worlds() {
        let (mut cluster, _) = build(Topology::Split { spaces: 1, games: 1 });
        let appmgr = AppKey::new(AppType::APP_MANAGER, 1);
        let space = cluster.keys_of(AppType::SPACE)[0];
        let game = cluster.keys_of(AppType::GAME)[0];
        cluster.store().insert(store_record(402, 3, None));

        let ada = login(&cluster, game, "ada", 401);
        let eve = login(&cluster, game, "eve", 402);
        cluster.run_until_idle(IDLE_ROUNDS);
        let node = cluster.node(game).unwrap();
        let world2 = proxies_of(node, 2)[0];
        let world3 = proxies_of(node, 3)[0];
        assert_eq!(world2.app_id(), space.app_id);
        assert_eq!(world3.app_id(), space.app_id);

        cluster.disconnect(space).unwrap();
        cluster.run_until_idle(IDLE_ROUNDS);

        assert!(ada.is_closed());
        assert!(eve.is_closed());
        let saved = cluster.store().get(Sn(401)).unwrap();
        assert_eq!(saved.last_public.world_sn, world2);
        assert_eq!(saved.current_world, 2);
        assert_eq!(cluster.store().get(Sn(402)).unwrap().last_public.world_sn, world3);

        let node = cluster.node(game).unwrap();
        assert_eq!(node.directory().worlds.public_world_sn(2), None);
        assert_eq!(node.directory().worlds.public_world_sn(3), None);
        assert!(proxies_of(node, 2).is_empty());
        let (_, _, registry) = cluster.node(appmgr).unwrap().component::<CreateWorldRegistry>().unwrap();
        assert_eq!(registry.created(2), None);
        assert_eq!(registry.created(3), None);
        assert!(registry.apps().is_empty());
    }

    #[test]
    fn test_console_commands_reach_every_process() {
        let (mut cluster, _) = build(Topology::Split { spaces: 1, games: 1 });
        for line in ["world", "app", "create", "pool"] {
            cluster.broadcast_local(parse_command(line).unwrap());
        }
        assert_eq!(cluster.pending(), 4 * cluster.nodes().count());
        cluster.run_until_idle(IDLE_ROUNDS);
        assert_eq!(cluster.pending(), 0);
    }
}
