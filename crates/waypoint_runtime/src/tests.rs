use crate::*;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outbound that loops local dispatches back into the shard inbox and records the rest.
struct Recorder {
    inbox: Arc<PacketQueue>,
    sent: Mutex<Vec<(Destination, Packet)>>,
    connects: Mutex<Vec<String>>,
    closed: Mutex<Vec<SocketKey>>,
    refuse_connects: AtomicBool,
}

impl Recorder {
    fn sent_to(&self, to: Destination) -> Vec<MsgId> {
        self.sent
            .lock()
            .iter()
            .filter(|(dest, _)| *dest == to)
            .map(|(_, packet)| packet.msg_id)
            .collect()
    }
}

impl Outbound for Recorder {
    fn dispatch_local(&self, packet: Packet) {
        self.inbox.push(Arc::new(packet));
    }

    fn send(&self, to: Destination, packet: Packet) -> Result<(), TransportError> {
        self.sent.lock().push((to, packet));
        Ok(())
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        if self.refuse_connects.load(Ordering::SeqCst) {
            return Err(TransportError::UnknownEndpoint(endpoint.to_string()));
        }
        self.connects.lock().push(endpoint.to_string());
        Ok(())
    }

    fn close_client(&self, socket: SocketKey) {
        self.closed.lock().push(socket);
    }
}

struct Harness {
    shard: Shard,
    outbound: Arc<Recorder>,
    clock: ManualClock,
    directory: Arc<Directory>,
}

fn harness(app_type: AppType) -> Harness {
    let identity = AppKey::new(app_type, 1);
    let inbox = Arc::new(PacketQueue::new());
    let outbound = Arc::new(Recorder {
        inbox: Arc::clone(&inbox),
        sent: Mutex::new(Vec::new()),
        connects: Mutex::new(Vec::new()),
        closed: Mutex::new(Vec::new()),
        refuse_connects: AtomicBool::new(false),
    });
    let directory = Arc::new(Directory::new(identity));
    let services = ProcessServices {
        identity,
        sn: Arc::new(SnGenerator::new(identity.app_id).unwrap()),
        outbound: outbound.clone(),
        directory: Arc::clone(&directory),
        catalog: Arc::new(StaticWorldCatalog::default()),
    };
    let clock = ManualClock::new(1_000);
    let ctx = ShardContext::new(app_type, services, clock.now_ms());
    Harness {
        shard: Shard::new("test", ctx, inbox, Arc::new(clock.clone())),
        outbound,
        clock,
        directory,
    }
}

type Log = Arc<Mutex<Vec<(Sn, String)>>>;

#[derive(Default)]
struct TracerInit {
    log: Log,
    msgs: Vec<MsgId>,
    register_twice: bool,
    with_default: bool,
    known_players: BTreeSet<Sn>,
}

/// Test component recording every packet it handles.
struct Tracer {
    sn: Sn,
    log: Log,
    known_players: BTreeSet<Sn>,
}

impl Tracer {
    fn record(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let seq = packet.tags.player.map(|p| p.0).unwrap_or(0);
        self.log.lock().push((self.sn, format!("{}:{}", packet.msg_id, seq)));
        Ok(())
    }

    fn record_default(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        self.log.lock().push((self.sn, format!("default:{}", packet.msg_id)));
        Ok(())
    }

    fn resolve_player(&self, _ctx: &ShardContext, packet: &Packet) -> Option<Sn> {
        packet.tags.player.filter(|player| self.known_players.contains(player))
    }

    fn on_player(&mut self, _ctx: &mut ShardContext, player: Sn, _packet: &Packet) -> HandlerResult {
        self.log.lock().push((self.sn, format!("player:{}", player)));
        Ok(())
    }

    fn leave(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        ctx.release(self.sn);
        self.log.lock().push((self.sn, "left".into()));
        Ok(())
    }

    fn fail(&mut self, _ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        Err(RuntimeError::Handler("tracer failure".into()))
    }
}

impl Component for Tracer {
    type Init = TracerInit;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: TracerInit) -> Self {
        for msg in &init.msgs {
            ctx.on::<Tracer>(sn, *msg, Tracer::record);
        }
        if init.register_twice {
            ctx.on::<Tracer>(sn, MsgId::Move, Tracer::record);
        }
        if init.with_default {
            ctx.on_default::<Tracer>(sn, Tracer::record_default);
        }
        ctx.on_filtered::<Tracer>(sn, MsgId::TeleportAfter, Tracer::resolve_player, Tracer::on_player);
        ctx.on::<Tracer>(sn, MsgId::RemovePlayer, Tracer::leave);
        ctx.on::<Tracer>(sn, MsgId::SavePlayer, Tracer::fail);
        Tracer {
            sn,
            log: init.log,
            known_players: init.known_players,
        }
    }

    fn dispose(&mut self, _ctx: &mut ShardContext, sn: Sn) {
        self.log.lock().push((sn, "disposed".into()));
    }
}

fn tracer(log: &Log, msgs: &[MsgId]) -> TracerInit {
    TracerInit {
        log: Arc::clone(log),
        msgs: msgs.to_vec(),
        ..TracerInit::default()
    }
}

fn push(h: &Harness, packet: Packet) {
    h.shard.inbox().push(Arc::new(packet));
}

fn entries(log: &Log) -> Vec<(Sn, String)> {
    log.lock().clone()
}

#[test]
fn untagged_packets_reach_every_owner_in_serial_order() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let first = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();
    let second = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();
    assert!(first < second);

    push(&h, Packet::empty(MsgId::Move));
    h.shard.tick();
    assert_eq!(
        entries(&log),
        vec![(first, "Move:0".to_string()), (second, "Move:0".to_string())]
    );
}

#[test]
fn entity_tag_limits_dispatch_to_one_owner() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let _first = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();
    let second = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();

    push(&h, Packet::empty(MsgId::Move).with_tags(RoutingTags::default().entity(second)));
    h.shard.tick();
    assert_eq!(entries(&log), vec![(second, "Move:0".to_string())]);
}

#[test]
fn default_handler_is_a_fallback_for_tagged_packets_only() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let owner = h
        .shard
        .spawn::<Tracer>(TracerInit {
            with_default: true,
            ..tracer(&log, &[MsgId::Move])
        })
        .unwrap();

    // registered message: the regular handler wins
    push(&h, Packet::empty(MsgId::Move).with_tags(RoutingTags::default().entity(owner)));
    // unregistered message with entity tag: default handler
    push(&h, Packet::empty(MsgId::EnterWorld).with_tags(RoutingTags::default().entity(owner)));
    // relayed towards a world: no fallback
    push(
        &h,
        Packet::empty(MsgId::EnterWorld).with_tags(RoutingTags::default().entity(owner).to_world(Sn(77))),
    );
    // no entity tag: no fallback
    push(&h, Packet::empty(MsgId::EnterWorld));
    h.shard.tick();

    assert_eq!(
        entries(&log),
        vec![(owner, "Move:0".to_string()), (owner, "default:EnterWorld".to_string())]
    );
    let stats = h.shard.stats().router;
    assert_eq!(stats.default_fallbacks, 1);
    assert_eq!(stats.unhandled, 2);
}

#[test]
fn duplicate_registration_keeps_a_single_handler() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let owner = h
        .shard
        .spawn::<Tracer>(TracerInit {
            register_twice: true,
            ..tracer(&log, &[MsgId::Move])
        })
        .unwrap();

    push(&h, Packet::empty(MsgId::Move));
    h.shard.tick();
    assert_eq!(entries(&log), vec![(owner, "Move:0".to_string())]);
}

#[test]
fn filtered_handler_skips_unresolved_targets() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let owner = h
        .shard
        .spawn::<Tracer>(TracerInit {
            known_players: [Sn(500)].into_iter().collect(),
            ..tracer(&log, &[])
        })
        .unwrap();

    push(&h, Packet::empty(MsgId::TeleportAfter).with_tags(RoutingTags::default().player(Sn(404))));
    push(&h, Packet::empty(MsgId::TeleportAfter).with_tags(RoutingTags::default().player(Sn(500))));
    h.shard.tick();
    assert_eq!(entries(&log), vec![(owner, "player:500".to_string())]);
}

#[test]
fn per_owner_order_matches_enqueue_order() {
    let mut h = harness(AppType::SPACE);
    let log = Log::default();
    let owner = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();
    for seq in 1..=50u64 {
        push(
            &h,
            Packet::empty(MsgId::Move).with_tags(RoutingTags::default().entity(owner).player(Sn(seq))),
        );
    }
    assert_eq!(h.shard.tick(), 50);
    let seen: Vec<String> = entries(&log).into_iter().map(|(_, entry)| entry).collect();
    let expected: Vec<String> = (1..=50).map(|seq| format!("Move:{}", seq)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn releasing_a_parent_releases_children_handlers_and_timers() {
    let mut h = harness(AppType::SPACE);
    let log = Log::default();
    let parent = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();
    let child = h
        .shard
        .with_context(|ctx| ctx.spawn::<Tracer>(parent, Sn::NULL, tracer(&log, &[MsgId::Move])))
        .unwrap();
    h.shard.with_context(|ctx| ctx.add_timer(child, MsgId::TimerWorldSync, 10, 10, true));
    assert_eq!(h.shard.context().entities.children(parent), &[child]);
    assert_eq!(h.shard.context().entities.parent(child), Some(parent));

    assert!(h.shard.with_context(|ctx| ctx.release(parent)));
    assert_eq!(
        entries(&log),
        vec![(child, "disposed".to_string()), (parent, "disposed".to_string())]
    );
    assert!(h.shard.context().entities.is_empty());
    assert_eq!(h.shard.context().timer_count(), 0);

    push(&h, Packet::empty(MsgId::Move));
    h.clock.advance(100);
    h.shard.tick();
    assert_eq!(entries(&log).len(), 2);
    assert_eq!(h.shard.stats().router.handlers, 0);

    let pools = h.shard.context().entities.stats();
    assert_eq!(pools[0].stats.in_use, 0);
    assert_eq!(pools[0].stats.retired, 0);
}

#[test]
fn component_released_by_its_own_handler_is_disposed_after_it_returns() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let owner = h.shard.spawn::<Tracer>(tracer(&log, &[])).unwrap();

    push(&h, Packet::empty(MsgId::RemovePlayer).with_tags(RoutingTags::default().entity(owner)));
    push(&h, Packet::empty(MsgId::RemovePlayer).with_tags(RoutingTags::default().entity(owner)));
    h.shard.tick();

    assert_eq!(
        entries(&log),
        vec![(owner, "left".to_string()), (owner, "disposed".to_string())]
    );
    assert!(h.shard.context().get::<Tracer>(owner).is_none());
}

#[test]
fn double_release_is_reported_and_harmless() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let victim = h.shard.spawn::<Tracer>(tracer(&log, &[])).unwrap();
    let bystander = h.shard.spawn::<Tracer>(tracer(&log, &[])).unwrap();

    assert!(h.shard.with_context(|ctx| ctx.release(victim)));
    assert!(!h.shard.with_context(|ctx| ctx.release(victim)));
    assert!(h.shard.context().get::<Tracer>(bystander).is_some());
    assert_eq!(entries(&log), vec![(victim, "disposed".to_string())]);
}

#[test]
fn reused_slots_get_fresh_serial_numbers() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let mut seen = BTreeSet::new();
    for _ in 0..3 {
        let batch: Vec<Sn> = (0..40)
            .map(|_| h.shard.spawn::<Tracer>(tracer(&log, &[])).unwrap())
            .collect();
        for sn in &batch {
            assert!(!sn.is_null());
            assert!(seen.insert(*sn));
            h.shard.with_context(|ctx| ctx.release(*sn));
        }
        h.shard.tick();
    }
    let pools = h.shard.context().entities.stats();
    assert_eq!(pools[0].component, "Tracer");
    assert_eq!(pools[0].stats.total, 50);
}

#[test]
fn attaching_the_same_component_type_twice_is_refused() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let parent = h.shard.spawn::<Tracer>(tracer(&log, &[])).unwrap();
    let first = h
        .shard
        .with_context(|ctx| ctx.add_component::<Tracer>(parent, tracer(&log, &[])))
        .unwrap();
    let second = h.shard.with_context(|ctx| ctx.add_component::<Tracer>(parent, tracer(&log, &[])));
    assert!(matches!(
        second,
        Err(RuntimeError::DuplicateComponent { component: "Tracer", parent: p }) if p == parent
    ));
    assert_eq!(
        h.shard.context().entities.child_of_type::<Tracer>(parent),
        Some(first)
    );
    assert_eq!(h.shard.context().entities.children(parent), &[first]);
}

#[test]
fn pinned_slots_are_not_reused_until_unpinned() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    let pinned = h.shard.spawn::<Tracer>(tracer(&log, &[])).unwrap();
    assert!(h.shard.context_mut().entities.add_ref::<Tracer>(pinned));

    assert!(h.shard.with_context(|ctx| ctx.release(pinned)));
    assert!(!h.shard.context_mut().entities.add_ref::<Tracer>(pinned));
    h.shard.tick();
    let pools = h.shard.context().entities.stats();
    assert_eq!(pools[0].stats.in_use, 0);
    assert_eq!(pools[0].stats.retired, 1);

    assert!(h.shard.context_mut().entities.remove_ref::<Tracer>(pinned));
    assert!(!h.shard.context_mut().entities.remove_ref::<Tracer>(pinned));
    h.shard.tick();
    assert_eq!(h.shard.context().entities.stats()[0].stats.retired, 0);
}

#[test]
fn handler_errors_are_counted_not_fatal() {
    let mut h = harness(AppType::GAME);
    let log = Log::default();
    h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::Move])).unwrap();
    push(&h, Packet::empty(MsgId::SavePlayer));
    push(&h, Packet::empty(MsgId::Move));
    h.shard.tick();
    assert_eq!(h.shard.stats().router.failures, 1);
    assert_eq!(entries(&log).len(), 1);
}

#[test]
fn timers_fire_as_packets_addressed_to_their_owner() {
    let mut h = harness(AppType::SPACE);
    let log = Log::default();
    let owner = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::TimerWorldSync])).unwrap();
    let other = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::TimerWorldSync])).unwrap();
    h.shard.with_context(|ctx| ctx.add_timer(owner, MsgId::TimerWorldSync, 100, 100, true));

    h.shard.tick();
    assert!(entries(&log).is_empty());
    h.clock.advance(100);
    h.shard.tick();
    h.clock.advance(100);
    h.shard.tick();
    let hits: Vec<Sn> = entries(&log).into_iter().map(|(sn, _)| sn).collect();
    assert_eq!(hits, vec![owner, owner]);
    assert!(!hits.contains(&other));
}

#[test]
fn sending_to_a_carried_type_dispatches_locally() {
    let mut h = harness(AppType::GAME | AppType::SPACE);
    let log = Log::default();
    let owner = h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::CreateWorld])).unwrap();

    let sent = h
        .shard
        .with_context(|ctx| ctx.send_to_app(AppType::SPACE, None, Packet::empty(MsgId::CreateWorld)));
    assert!(sent);
    h.shard.tick();
    assert_eq!(entries(&log), vec![(owner, "CreateWorld:0".to_string())]);
    assert!(h.outbound.sent.lock().is_empty());
}

#[test]
fn sending_to_a_remote_type_goes_through_the_network_locator() {
    let mut h = harness(AppType::GAME);
    let manager = AppKey::new(AppType::APP_MANAGER, 1);
    let space_one = AppKey::new(AppType::SPACE, 1);
    let space_two = AppKey::new(AppType::SPACE, 2);
    h.directory.network.register_inbound(manager);
    h.directory.network.register_inbound(space_one);
    h.directory.network.register_inbound(space_two);

    let results = h.shard.with_context(|ctx| {
        (
            ctx.send_to_app(AppType::APP_MANAGER, None, Packet::empty(MsgId::RequestWorld)),
            ctx.send_to_app(AppType::SPACE, Some(2), Packet::empty(MsgId::CreateWorld)),
            ctx.send_to_app(AppType::DB, None, Packet::empty(MsgId::SavePlayer)),
            ctx.send_to_all(AppType::SPACE, Packet::empty(MsgId::AppInfoSync)),
        )
    });
    assert_eq!(results, (true, true, false, 2));
    assert_eq!(h.outbound.sent_to(Destination::App(manager)), vec![MsgId::RequestWorld]);
    assert_eq!(h.outbound.sent_to(Destination::App(space_one)), vec![MsgId::AppInfoSync]);
    assert_eq!(
        h.outbound.sent_to(Destination::App(space_two)),
        vec![MsgId::CreateWorld, MsgId::AppInfoSync]
    );
}

#[test]
fn replies_follow_the_request_origin() {
    let mut h = harness(AppType::DB);
    let game = AppKey::new(AppType::GAME, 3);
    let remote = Packet::empty(MsgId::QueryPlayer).with_tags(RoutingTags::default().app(game));
    let client = Packet::empty(MsgId::EnterWorld).with_tags(RoutingTags::default().socket(SocketKey(9)));
    h.shard.with_context(|ctx| {
        ctx.reply(&remote, Packet::empty(MsgId::QueryPlayerRs));
        ctx.reply(&client, Packet::empty(MsgId::EnterWorldNotice));
        ctx.close_client(SocketKey(9));
    });
    assert_eq!(h.outbound.sent_to(Destination::App(game)), vec![MsgId::QueryPlayerRs]);
    assert_eq!(
        h.outbound.sent_to(Destination::Client(SocketKey(9))),
        vec![MsgId::EnterWorldNotice]
    );
    assert_eq!(*h.outbound.closed.lock(), vec![SocketKey(9)]);
}

fn link_agent(h: &mut Harness, discovery: StaticDiscovery) -> Sn {
    h.shard
        .spawn::<LinkAgent>(LinkAgentInit {
            discovery: Arc::new(discovery),
            retry_interval_ms: 500,
        })
        .unwrap()
}

#[test]
fn outbound_link_announces_this_process() {
    let mut h = harness(AppType::GAME);
    link_agent(&mut h, StaticDiscovery::new());
    let space = AppKey::new(AppType::SPACE, 1);
    let db = AppKey::new(AppType::DB, 1);

    for key in [space, db] {
        let up = Packet::new(
            MsgId::NetworkConnect,
            &LinkUp {
                endpoint: format!("mem://{}", key),
            },
        )
        .unwrap()
        .with_tags(RoutingTags::default().app(key));
        push(&h, up);
    }
    h.shard.tick();

    assert!(h.directory.network.contains(space));
    assert!(h.directory.network.contains(db));
    let announced = h.outbound.sent.lock().clone();
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0].0, Destination::App(space));
    let register: AppRegister = announced[0].1.decode().unwrap();
    assert_eq!(register.app_type, AppType::GAME);
}

#[test]
fn inbound_registration_emits_listen_key_once() {
    let mut h = harness(AppType::SPACE);
    let log = Log::default();
    link_agent(&mut h, StaticDiscovery::new());
    h.shard.spawn::<Tracer>(tracer(&log, &[MsgId::NetworkListenKey])).unwrap();

    let game = AppKey::new(AppType::GAME, 4);
    let register = Packet::new(
        MsgId::AppRegister,
        &AppRegister {
            app_type: game.app_type,
            app_id: game.app_id,
        },
    )
    .unwrap()
    .with_tags(RoutingTags::default().app(game));
    push(&h, register.clone());
    push(&h, register);
    h.shard.tick();
    h.shard.tick();

    assert_eq!(entries(&log).len(), 1);
    assert_eq!(h.directory.network.app_keys(AppType::GAME), vec![game]);
}

#[test]
fn lost_outbound_link_reconnects_through_discovery() {
    let mut h = harness(AppType::GAME);
    let manager = AppKey::new(AppType::APP_MANAGER, 1);
    let discovery: StaticDiscovery = [(manager, "mem://appmgr-1".to_string())].into_iter().collect();
    link_agent(&mut h, discovery);
    h.directory.network.add_outbound(manager, None);

    h.outbound.refuse_connects.store(true, Ordering::SeqCst);
    push(&h, Packet::empty(MsgId::NetworkDisconnect).with_tags(RoutingTags::default().app(manager)));
    h.shard.tick();
    assert!(!h.directory.network.contains(manager));
    assert!(h.outbound.connects.lock().is_empty());

    h.outbound.refuse_connects.store(false, Ordering::SeqCst);
    h.clock.advance(500);
    h.shard.tick();
    assert_eq!(*h.outbound.connects.lock(), vec!["mem://appmgr-1".to_string()]);

    h.clock.advance(500);
    h.shard.tick();
    assert_eq!(h.outbound.connects.lock().len(), 1);
}
