//! Single-shard harness for role component tests.

use parking_lot::Mutex;
use std::sync::Arc;
use waypoint_runtime::*;

pub fn world(id: WorldId, kind: WorldKind) -> WorldInfo {
    WorldInfo {
        id,
        name: format!("world-{}", id),
        kind,
        spawn: Position::new(id as f32, 0.0, 0.0),
    }
}

/// Lobby 1, public worlds 2 and 3, dungeon 10.
pub fn catalog() -> StaticWorldCatalog {
    StaticWorldCatalog::new(vec![
        world(1, WorldKind::Roles),
        world(2, WorldKind::Public),
        world(3, WorldKind::Public),
        world(10, WorldKind::Dungeon),
    ])
}

/// Outbound looping local dispatches back into the shard and recording everything.
pub struct Recorder {
    inbox: Arc<PacketQueue>,
    pub dispatched: Mutex<Vec<Packet>>,
    pub sent: Mutex<Vec<(Destination, Packet)>>,
    pub closed: Mutex<Vec<SocketKey>>,
}

impl Outbound for Recorder {
    fn dispatch_local(&self, packet: Packet) {
        self.dispatched.lock().push(packet.clone());
        self.inbox.push(Arc::new(packet));
    }

    fn send(&self, to: Destination, packet: Packet) -> Result<(), TransportError> {
        self.sent.lock().push((to, packet));
        Ok(())
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        Err(TransportError::UnknownEndpoint(endpoint.to_string()))
    }

    fn close_client(&self, socket: SocketKey) {
        self.closed.lock().push(socket);
    }
}

pub struct TestShard {
    pub shard: Shard,
    pub outbound: Arc<Recorder>,
    pub clock: ManualClock,
    pub directory: Arc<Directory>,
}

impl TestShard {
    /// A shard running `role` inside a process of type `role` with id `app_id`.
    pub fn new(role: AppType, app_id: AppId) -> Self {
        Self::hosting(role, role, app_id)
    }

    /// A shard running `role` inside a process carrying `process`.
    pub fn hosting(role: AppType, process: AppType, app_id: AppId) -> Self {
        let identity = AppKey::new(process, app_id);
        let inbox = Arc::new(PacketQueue::new());
        let outbound = Arc::new(Recorder {
            inbox: Arc::clone(&inbox),
            dispatched: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        });
        let directory = Arc::new(Directory::new(identity));
        let services = ProcessServices {
            identity,
            sn: Arc::new(SnGenerator::new(app_id).unwrap()),
            outbound: outbound.clone(),
            directory: Arc::clone(&directory),
            catalog: Arc::new(catalog()),
        };
        let clock = ManualClock::new(1_000_000);
        let ctx = ShardContext::new(role, services, clock.now_ms());
        Self {
            shard: Shard::new("test", ctx, inbox, Arc::new(clock.clone())),
            outbound,
            clock,
            directory,
        }
    }

    pub fn push(&self, packet: Packet) {
        self.shard.inbox().push(Arc::new(packet));
    }

    /// Records an outbound link to `key`.
    pub fn link(&self, key: AppKey) {
        self.directory.network.add_outbound(key, None);
    }

    pub fn sent_packets(&self, to: Destination) -> Vec<Packet> {
        self.outbound
            .sent
            .lock()
            .iter()
            .filter(|(dest, _)| *dest == to)
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    pub fn sent_to(&self, to: Destination) -> Vec<MsgId> {
        self.sent_packets(to).iter().map(|packet| packet.msg_id).collect()
    }

    pub fn dispatched(&self) -> Vec<MsgId> {
        self.outbound.dispatched.lock().iter().map(|packet| packet.msg_id).collect()
    }
}
