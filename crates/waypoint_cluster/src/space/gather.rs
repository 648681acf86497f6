use super::world::World;
use crate::proto::WorldSyncToGather;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use tracing::{debug, info};
use waypoint_runtime::{
    AppInfo, AppType, Component, Destination, HandlerResult, MsgId, Packet, ShardContext, Sn,
};

pub struct GatherInit {
    pub endpoint: String,
    pub app_sync_interval_ms: u64,
}

/// Online counts of the local worlds, reported upstream as this process's load.
pub struct WorldGather {
    endpoint: String,
    online: BTreeMap<Sn, u32>,
}

impl Component for WorldGather {
    type Init = GatherInit;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: GatherInit) -> Self {
        ctx.on::<Self>(sn, MsgId::WorldSyncToGather, Self::handle_world_sync);
        ctx.on::<Self>(sn, MsgId::TimerAppSync, Self::handle_app_sync);
        ctx.on::<Self>(sn, MsgId::NetworkConnect, Self::handle_new_link);
        ctx.on::<Self>(sn, MsgId::NetworkListenKey, Self::handle_new_link);
        ctx.on::<Self>(sn, MsgId::CmdWorld, Self::handle_cmd_world);
        ctx.add_timer(sn, MsgId::TimerAppSync, 0, init.app_sync_interval_ms, true);
        Self {
            endpoint: init.endpoint,
            online: BTreeMap::new(),
        }
    }
}

impl WorldGather {
    pub fn online(&self) -> u32 {
        self.online.values().sum()
    }

    fn app_info(&self, ctx: &ShardContext) -> AppInfo {
        let identity = ctx.identity();
        AppInfo {
            app_type: identity.app_type,
            app_id: identity.app_id,
            ip: self.endpoint.clone(),
            port: 0,
            online: self.online(),
        }
    }

    fn handle_world_sync(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let report: WorldSyncToGather = packet.decode()?;
        self.online.insert(report.world_sn, report.online);
        Ok(())
    }

    /// Pushes this process's load to every game process and the app manager.
    fn handle_app_sync(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        self.online.retain(|sn, _| ctx.entities.is::<World>(*sn));
        let packet = Packet::new(MsgId::AppInfoSync, &self.app_info(ctx))?;

        let mut remote = BTreeSet::new();
        let mut local = false;
        for role in [AppType::GAME, AppType::APP_MANAGER] {
            if ctx.hosts(role) {
                local = true;
            } else {
                remote.extend(ctx.directory().network.app_keys(role));
            }
        }
        for key in remote {
            ctx.send(Destination::App(key), packet.clone());
        }
        if local {
            ctx.dispatch(packet);
        }
        Ok(())
    }

    /// New links to interested processes get the current load right away.
    fn handle_new_link(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let Some(key) = packet.tags.app else {
            return Ok(());
        };
        if key.app_type.intersects(AppType::GAME | AppType::APP_MANAGER) {
            debug!("📊 Sending load to new link {}", key);
            ctx.send(Destination::App(key), Packet::new(MsgId::AppInfoSync, &self.app_info(ctx))?);
        }
        Ok(())
    }

    fn handle_cmd_world(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        let mut out = String::new();
        let _ = writeln!(out, "{} worlds, {} online", self.online.len(), self.online());
        for (sn, online) in &self.online {
            let world_id = ctx.get::<World>(*sn).map(|world| world.world_id());
            let _ = writeln!(out, "  world {:?} {} online={}", world_id, sn, online);
        }
        info!("🗺️ Space worlds\n{}", out.trim_end());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestShard;
    use waypoint_runtime::AppKey;

    #[test]
    fn load_reports_sum_world_counts() {
        let mut test = TestShard::hosting(AppType::SPACE, AppType::SPACE | AppType::APP_MANAGER, 3);
        let game = AppKey::new(AppType::GAME, 5);
        test.link(game);
        let sn = test
            .shard
            .spawn::<WorldGather>(GatherInit {
                endpoint: "mem://space-3".into(),
                app_sync_interval_ms: 5_000,
            })
            .unwrap();

        // The first report goes out on the first tick.
        test.shard.tick();
        assert_eq!(test.sent_to(Destination::App(game)), vec![MsgId::AppInfoSync]);
        assert_eq!(test.dispatched(), vec![MsgId::AppInfoSync]);

        test.push(Packet::new(MsgId::WorldSyncToGather, &WorldSyncToGather { world_sn: Sn(9), online: 4 }).unwrap());
        test.shard.tick();
        assert_eq!(test.shard.context().get::<WorldGather>(sn).unwrap().online(), 4);

        // Sn(9) is not a live world, so it is pruned before the next report.
        test.clock.advance(5_000);
        test.shard.tick();
        let reports = test.sent_packets(Destination::App(game));
        assert_eq!(reports.len(), 2);
        let info: AppInfo = reports[1].decode().unwrap();
        assert_eq!(info.online, 0);
        assert_eq!(info.app_id, 3);
    }
}
