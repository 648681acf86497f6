//! Player persistence role.
//!
//! The db process answers record queries from game processes and stores the records
//! saved by worlds. Storage sits behind [`PlayerStore`]; the bundled
//! [`MemoryPlayerStore`] keeps everything in memory for the lifetime of the process.

use crate::player::PlayerRecord;
use crate::proto::{PlayerState, QueryPlayer};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use waypoint_runtime::{Component, HandlerResult, MsgId, Packet, ShardContext, Sn};

/// Backing storage of player records.
pub trait PlayerStore: Send + Sync {
    fn load(&self, player_sn: Sn) -> Option<PlayerRecord>;

    fn save(&self, record: &PlayerRecord);
}

#[derive(Debug, Default)]
pub struct MemoryPlayerStore {
    records: Mutex<BTreeMap<Sn, PlayerRecord>>,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player_sn: Sn) -> Option<PlayerRecord> {
        self.records.lock().get(&player_sn).cloned()
    }

    pub fn insert(&self, record: PlayerRecord) {
        self.records.lock().insert(record.sn, record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl PlayerStore for MemoryPlayerStore {
    fn load(&self, player_sn: Sn) -> Option<PlayerRecord> {
        self.get(player_sn)
    }

    fn save(&self, record: &PlayerRecord) {
        self.insert(record.clone());
    }
}

/// Serves player records out of a [`PlayerStore`].
pub struct PlayerArchive {
    store: Arc<dyn PlayerStore>,
}

impl Component for PlayerArchive {
    type Init = Arc<dyn PlayerStore>;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, store: Arc<dyn PlayerStore>) -> Self {
        ctx.on::<Self>(sn, MsgId::QueryPlayer, Self::handle_query);
        ctx.on::<Self>(sn, MsgId::SavePlayer, Self::handle_save);
        Self { store }
    }
}

impl PlayerArchive {
    fn handle_query(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let query: QueryPlayer = packet.decode()?;
        let record = match self.store.load(query.player_sn) {
            Some(record) => record,
            None => {
                let Some(start) = ctx.catalog().initial_public().cloned() else {
                    error!("🔴 No public world to start {} in", query.account);
                    return Ok(());
                };
                info!("🆕 New player {} ({})", query.account, query.player_sn);
                let record = PlayerRecord::new(query.player_sn, query.account.clone(), &start);
                self.store.save(&record);
                record
            }
        };

        let state = PlayerState {
            account: query.account,
            record,
        };
        ctx.reply(packet, Packet::new(MsgId::QueryPlayerRs, &state)?);
        Ok(())
    }

    fn handle_save(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let state: PlayerState = packet.decode()?;
        debug!("💾 Saving {} ({})", state.account, state.record.sn);
        self.store.save(&state.record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestShard;
    use waypoint_runtime::{AppKey, AppType, Destination, RoutingTags};

    const GAME: AppKey = AppKey {
        app_type: AppType::GAME,
        app_id: 4,
    };

    #[test]
    fn unknown_players_start_in_the_first_public_world() {
        let store = Arc::new(MemoryPlayerStore::new());
        let mut test = TestShard::new(AppType::DB, 2);
        test.shard.spawn::<PlayerArchive>(store.clone()).unwrap();

        let query = QueryPlayer {
            account: "ada".into(),
            player_sn: Sn(77),
        };
        test.push(
            Packet::new(MsgId::QueryPlayer, &query)
                .unwrap()
                .with_tags(RoutingTags::default().app(GAME)),
        );
        test.shard.tick();

        let answers = test.sent_packets(Destination::App(GAME));
        assert_eq!(answers.len(), 1);
        let state: PlayerState = answers[0].decode().unwrap();
        assert_eq!(state.record.last_public.world_id, 2);
        assert_eq!(store.get(Sn(77)).map(|r| r.name), Some("ada".to_string()));
    }

    #[test]
    fn saved_records_are_served_back() {
        let store = Arc::new(MemoryPlayerStore::new());
        let mut test = TestShard::new(AppType::DB, 2);
        test.shard.spawn::<PlayerArchive>(store.clone()).unwrap();

        let mut record = PlayerRecord::default();
        record.sn = Sn(5);
        record.last_public.world_id = 3;
        let state = PlayerState {
            account: "bo".into(),
            record,
        };
        test.push(Packet::new(MsgId::SavePlayer, &state).unwrap());
        test.push(
            Packet::new(
                MsgId::QueryPlayer,
                &QueryPlayer {
                    account: "bo".into(),
                    player_sn: Sn(5),
                },
            )
            .unwrap()
            .with_tags(RoutingTags::default().app(GAME)),
        );
        test.shard.tick();

        let answer: PlayerState = test.sent_packets(Destination::App(GAME))[0].decode().unwrap();
        assert_eq!(answer.record.last_public.world_id, 3);
        assert_eq!(store.len(), 1);
    }
}
