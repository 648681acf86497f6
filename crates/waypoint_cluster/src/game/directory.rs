use tracing::info;
use waypoint_runtime::{
    AppInfo, AppRegistry, AppType, Component, HandlerResult, MsgId, Packet, ShardContext, Sn,
};

/// Load table of the space processes, as seen by a game process.
pub struct SpaceDirectory {
    apps: AppRegistry,
}

impl Component for SpaceDirectory {
    type Init = ();
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, _init: ()) -> Self {
        ctx.on::<Self>(sn, MsgId::AppInfoSync, Self::handle_app_info);
        ctx.on::<Self>(sn, MsgId::NetworkDisconnect, Self::handle_disconnect);
        ctx.on::<Self>(sn, MsgId::CmdApp, Self::handle_cmd_app);
        Self {
            apps: AppRegistry::new(),
        }
    }
}

impl SpaceDirectory {
    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    /// Picks the least loaded space process known to this shard.
    pub fn pick(ctx: &mut ShardContext) -> Option<AppInfo> {
        let sn = ctx.entities.first::<SpaceDirectory>()?;
        ctx.with_component::<SpaceDirectory, _>(sn, |directory, _| directory.apps.pick_least_loaded(AppType::SPACE))
            .flatten()
    }

    fn handle_app_info(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let info: AppInfo = packet.decode()?;
        if info.app_type.intersects(AppType::SPACE) {
            self.apps.apply_sync(info);
        }
        Ok(())
    }

    fn handle_disconnect(&mut self, _ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        if packet.tags.socket.is_some() {
            return Ok(());
        }
        if let Some(key) = packet.tags.app {
            if self.apps.remove(key).is_some() {
                info!("🔌 Space {} dropped from the directory", key);
            }
        }
        Ok(())
    }

    fn handle_cmd_app(&mut self, _ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        info!("🗂️ Known spaces\n{}", self.apps.dump());
        Ok(())
    }
}
