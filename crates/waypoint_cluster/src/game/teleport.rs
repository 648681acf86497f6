//! # Teleport tracking
//!
//! A transfer between worlds waits on two independent conditions:
//!
//! - **world**: the target world exists and its serial number is known
//! - **sync**: the current world sent back the authoritative player state
//!
//! Each is a [`FlagState`]. The transfer completes on the first check that sees both
//! ready, in whichever order they arrived. Transfers still waiting past their deadline
//! are cancelled.

use super::directory::SpaceDirectory;
use super::routing::send_to_world;
use crate::player::Player;
use crate::proto::{CreateWorld, PlayerRef, RequestWorld};
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use waypoint_runtime::{
    AppType, Component, MsgId, Packet, PacketError, ShardContext, Sn, WorldId, WorldInfo, WorldKind,
};

/// Progress of one condition of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState<T> {
    Pending,
    Waiting { since_ms: u64 },
    Ready(T),
}

impl<T: Copy> FlagState<T> {
    pub fn ready(&self) -> Option<T> {
        match self {
            FlagState::Ready(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FlagState::Ready(_))
    }
}

pub struct TeleportInit {
    pub player_sn: Sn,
    pub target_world_id: WorldId,
    pub deadline_ms: u64,
}

/// One transfer in flight, owned by the proxy of the world the player is leaving.
#[derive(Debug)]
pub struct TeleportObject {
    pub player_sn: Sn,
    pub target_world_id: WorldId,
    pub world: FlagState<Sn>,
    pub sync: FlagState<()>,
    pub deadline_ms: u64,
}

impl Component for TeleportObject {
    type Init = TeleportInit;

    fn awake(_ctx: &mut ShardContext, _sn: Sn, init: TeleportInit) -> Self {
        Self {
            player_sn: init.player_sn,
            target_world_id: init.target_world_id,
            world: FlagState::Pending,
            sync: FlagState::Pending,
            deadline_ms: init.deadline_ms,
        }
    }
}

/// Result of checking a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportOutcome {
    /// Still waiting on at least one condition.
    Pending,
    /// Both conditions met: move the player to `world_sn`.
    Ready { world_id: WorldId, world_sn: Sn },
    /// Inconsistent state, the transfer was dropped and the player stays.
    Aborted { world_id: WorldId },
}

/// Transfers started from one world proxy, by player.
#[derive(Debug)]
pub struct TeleportTracker {
    owner: Sn,
    timeout_ms: u64,
    objects: BTreeMap<Sn, Sn>,
}

impl TeleportTracker {
    pub fn new(owner: Sn, timeout_ms: u64) -> Self {
        Self {
            owner,
            timeout_ms,
            objects: BTreeMap::new(),
        }
    }

    pub fn is_teleporting(&self, player_sn: Sn) -> bool {
        self.objects.contains_key(&player_sn)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object<'a>(&self, ctx: &'a ShardContext, player_sn: Sn) -> Option<&'a TeleportObject> {
        self.objects.get(&player_sn).and_then(|sn| ctx.get::<TeleportObject>(*sn))
    }

    fn object_mut<'a>(&self, ctx: &'a mut ShardContext, player_sn: Sn) -> Option<&'a mut TeleportObject> {
        let sn = *self.objects.get(&player_sn)?;
        ctx.get_mut::<TeleportObject>(sn)
    }

    /// Starts moving `player` from the owner world to `target`.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Context of the owning proxy's shard
    /// * `player` - The player, held by the owning proxy
    /// * `target` - Catalog entry of the destination world
    ///
    /// # Returns
    ///
    /// `false` when a transfer is already running for the player or no host can be
    /// found for the target.
    pub fn begin(&mut self, ctx: &mut ShardContext, player: &Player, target: &WorldInfo) -> Result<bool, PacketError> {
        let player_sn = player.player_sn;
        if self.is_teleporting(player_sn) {
            warn!("⚠️ Player {} is already teleporting", player_sn);
            return Ok(false);
        }

        let world = match target.kind {
            WorldKind::Public => match ctx.directory().worlds.public_world_sn(target.id) {
                Some(world_sn) => FlagState::Ready(world_sn),
                None => {
                    let request = Packet::new(MsgId::RequestWorld, &RequestWorld { world_id: target.id })?;
                    ctx.send_to_app(AppType::APP_MANAGER, None, request);
                    FlagState::Waiting { since_ms: ctx.now_ms() }
                }
            },
            WorldKind::Dungeon => {
                let Some(space) = SpaceDirectory::pick(ctx) else {
                    error!("🔴 No space can host dungeon {} for player {}", target.id, player_sn);
                    return Ok(false);
                };
                let create = CreateWorld {
                    world_id: target.id,
                    last_world_sn: self.owner,
                    game_app_id: Some(ctx.identity().app_id),
                };
                ctx.send_to_app(AppType::SPACE, Some(space.app_id), Packet::new(MsgId::CreateWorld, &create)?);
                FlagState::Waiting { since_ms: ctx.now_ms() }
            }
            WorldKind::Login | WorldKind::Roles => {
                error!("🔴 World {} cannot be a teleport target", target.id);
                return Ok(false);
            }
        };

        let init = TeleportInit {
            player_sn,
            target_world_id: target.id,
            deadline_ms: ctx.now_ms() + self.timeout_ms,
        };
        let object_sn = match ctx.spawn::<TeleportObject>(self.owner, Sn::NULL, init) {
            Ok(sn) => sn,
            Err(e) => {
                error!("🔴 Failed to start teleport of {}: {}", player_sn, e);
                return Ok(false);
            }
        };
        self.objects.insert(player_sn, object_sn);

        let sync_request = Packet::new(MsgId::RequestSyncPlayer, &PlayerRef { player_sn })?;
        send_to_world(ctx, self.owner, player_sn, sync_request);

        let now = ctx.now_ms();
        if let Some(object) = ctx.get_mut::<TeleportObject>(object_sn) {
            object.world = world;
            object.sync = FlagState::Waiting { since_ms: now };
        }
        info!("🌀 Player {} teleporting to world {}", player_sn, target.id);
        Ok(true)
    }

    /// Marks the world condition ready for transfers waiting on `world_id`.
    ///
    /// Every transfer to a public world is released at once; a new dungeon instance
    /// serves the first transfer waiting for it. Returns the affected players.
    pub fn on_world_ready(&mut self, ctx: &mut ShardContext, info: &WorldInfo, world_sn: Sn) -> Vec<Sn> {
        let waiting: Vec<Sn> = self
            .objects
            .keys()
            .copied()
            .filter(|player_sn| {
                self.object(ctx, *player_sn)
                    .is_some_and(|o| o.target_world_id == info.id && !o.world.is_ready())
            })
            .collect();

        let affected: Vec<Sn> = match info.kind {
            WorldKind::Public => waiting,
            WorldKind::Dungeon => {
                if waiting.is_empty() {
                    error!("🔴 Dungeon {} ({}) is up but nobody in {} waits for it", info.id, world_sn, self.owner);
                }
                waiting.into_iter().take(1).collect()
            }
            _ => Vec::new(),
        };
        for player_sn in &affected {
            if let Some(object) = self.object_mut(ctx, *player_sn) {
                object.world = FlagState::Ready(world_sn);
            }
        }
        affected
    }

    /// Marks the sync condition ready. Returns `false` when no transfer is running.
    pub fn on_player_synced(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> bool {
        match self.object_mut(ctx, player_sn) {
            Some(object) => {
                object.sync = FlagState::Ready(());
                true
            }
            None => false,
        }
    }

    /// Completes the transfer of `player_sn` when both conditions are ready.
    pub fn check(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> TeleportOutcome {
        let Some(object) = self.object(ctx, player_sn) else {
            return TeleportOutcome::Pending;
        };
        let (Some(world_sn), Some(())) = (object.world.ready(), object.sync.ready()) else {
            return TeleportOutcome::Pending;
        };
        let target = object.target_world_id;

        self.finish(ctx, player_sn);
        if world_sn.is_null() {
            error!("🔴 Teleport of {} to world {} has no world serial number", player_sn, target);
            return TeleportOutcome::Aborted { world_id: target };
        }
        TeleportOutcome::Ready {
            world_id: target,
            world_sn,
        }
    }

    /// Cancels transfers past their deadline. Returns the players and their targets.
    pub fn sweep(&mut self, ctx: &mut ShardContext) -> Vec<(Sn, WorldId)> {
        let now = ctx.now_ms();
        let expired: Vec<(Sn, WorldId)> = self
            .objects
            .keys()
            .filter_map(|player_sn| {
                self.object(ctx, *player_sn)
                    .filter(|o| o.deadline_ms <= now)
                    .map(|o| (*player_sn, o.target_world_id))
            })
            .collect();
        for (player_sn, world_id) in &expired {
            warn!("⏰ Teleport of {} to world {} timed out", player_sn, world_id);
            self.finish(ctx, *player_sn);
        }
        expired
    }

    /// Drops the transfer of a player that went away.
    pub fn cancel(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> bool {
        self.finish(ctx, player_sn)
    }

    fn finish(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> bool {
        match self.objects.remove(&player_sn) {
            Some(object_sn) => ctx.release(object_sn),
            None => false,
        }
    }
}
