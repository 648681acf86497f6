//! Player records and the per-owner player collections.
//!
//! A [`PlayerRecord`] is the persistent part of a player: where they were last seen
//! in a public world and, optionally, in a dungeon instance. A [`Player`] is the live
//! session held by a lobby, a world proxy or a world. [`PlayerCollection`] spawns
//! players as children of their owner so releasing the owner drops its players.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, warn};
use waypoint_runtime::{
    AppKey, Component, Position, ShardContext, Sn, SocketKey, WorldCatalog, WorldId, WorldInfo, WorldKind,
};

/// Last known location of a player in one world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastWorld {
    pub world_id: WorldId,
    #[serde(default)]
    pub world_sn: Sn,
    #[serde(default)]
    pub position: Position,
}

impl LastWorld {
    fn spawn_of(info: &WorldInfo, world_sn: Sn) -> Self {
        Self {
            world_id: info.id,
            world_sn,
            position: info.spawn,
        }
    }
}

/// Persistent state of a player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub sn: Sn,
    pub name: String,
    pub last_public: LastWorld,
    #[serde(default)]
    pub last_dungeon: Option<LastWorld>,
    /// World the player is in, 0 while in the lobby.
    #[serde(default)]
    pub current_world: WorldId,
}

impl PlayerRecord {
    /// A fresh player placed at the spawn point of `start`.
    pub fn new(sn: Sn, name: impl Into<String>, start: &WorldInfo) -> Self {
        Self {
            sn,
            name: name.into(),
            last_public: LastWorld::spawn_of(start, Sn::NULL),
            last_dungeon: None,
            current_world: 0,
        }
    }

    /// Drops locations the catalog no longer knows.
    ///
    /// An unknown public world sends the player back to the initial public world, an
    /// unknown dungeon is forgotten.
    pub fn normalize(&mut self, catalog: &dyn WorldCatalog) {
        if catalog.kind_of(self.last_public.world_id) != Some(WorldKind::Public) {
            match catalog.initial_public() {
                Some(start) => {
                    warn!(
                        "⚠️ Player {} was in unknown public world {}, moved to {}",
                        self.sn, self.last_public.world_id, start.id
                    );
                    self.last_public = LastWorld::spawn_of(start, Sn::NULL);
                }
                None => error!("🔴 No public world in the catalog for player {}", self.sn),
            }
        }

        let dungeon_known = self
            .last_dungeon
            .as_ref()
            .map_or(true, |d| catalog.kind_of(d.world_id) == Some(WorldKind::Dungeon));
        if !dungeon_known {
            self.last_dungeon = None;
        }
    }

    /// Records that the player entered world `world_sn` of kind `info`.
    ///
    /// Re-entering the same public world keeps the last position; any other public
    /// world or a new dungeon instance starts at its spawn point.
    pub fn enter_world(&mut self, info: &WorldInfo, world_sn: Sn) {
        match info.kind {
            WorldKind::Public => {
                if self.last_public.world_id == info.id {
                    self.last_public.world_sn = world_sn;
                } else {
                    self.last_public = LastWorld::spawn_of(info, world_sn);
                }
            }
            WorldKind::Dungeon => {
                let same = self
                    .last_dungeon
                    .as_ref()
                    .is_some_and(|d| d.world_id == info.id && d.world_sn == world_sn);
                if !same {
                    self.last_dungeon = Some(LastWorld::spawn_of(info, world_sn));
                }
            }
            WorldKind::Login | WorldKind::Roles => {}
        }
        self.current_world = info.id;
    }

    fn current_mut(&mut self) -> Option<&mut LastWorld> {
        let current = self.current_world;
        if let Some(dungeon) = self.last_dungeon.as_mut().filter(|d| d.world_id == current) {
            return Some(dungeon);
        }
        (self.last_public.world_id == current).then_some(&mut self.last_public)
    }

    /// Position in the current world, if the player is in one.
    pub fn position(&self) -> Option<Position> {
        let current = self.current_world;
        match &self.last_dungeon {
            Some(d) if d.world_id == current => Some(d.position),
            _ => (self.last_public.world_id == current).then_some(self.last_public.position),
        }
    }

    /// Moves the player inside its current world. Returns `false` outside of a world.
    pub fn move_to(&mut self, position: Position) -> bool {
        match self.current_mut() {
            Some(last) => {
                last.position = position;
                true
            }
            None => false,
        }
    }
}

/// Live session of a player.
#[derive(Debug, Clone)]
pub struct Player {
    pub player_sn: Sn,
    pub account: String,
    pub socket: Option<SocketKey>,
    /// Game process relaying for this player; `None` when co-hosted.
    pub gateway: Option<AppKey>,
    pub record: PlayerRecord,
}

impl Component for Player {
    type Init = Player;

    fn awake(_ctx: &mut ShardContext, _sn: Sn, init: Player) -> Self {
        init
    }
}

/// Players of one owner, indexed by player, socket and account.
#[derive(Debug)]
pub struct PlayerCollection {
    owner: Sn,
    by_player: BTreeMap<Sn, Sn>,
    by_socket: HashMap<SocketKey, Sn>,
    by_account: HashMap<String, Sn>,
}

impl PlayerCollection {
    pub fn new(owner: Sn) -> Self {
        Self {
            owner,
            by_player: BTreeMap::new(),
            by_socket: HashMap::new(),
            by_account: HashMap::new(),
        }
    }

    /// Adds a player session as a child of the owner.
    ///
    /// # Returns
    ///
    /// `false` when the player or its account is already present.
    pub fn add(&mut self, ctx: &mut ShardContext, player: Player) -> bool {
        let player_sn = player.player_sn;
        if self.by_player.contains_key(&player_sn) || self.by_account.contains_key(&player.account) {
            error!(
                "🔴 Player {} ({}) is already held by {}",
                player_sn, player.account, self.owner
            );
            return false;
        }

        let socket = player.socket;
        let account = player.account.clone();
        match ctx.spawn::<Player>(self.owner, Sn::NULL, player) {
            Ok(component) => {
                self.by_player.insert(player_sn, component);
                if let Some(socket) = socket {
                    self.by_socket.insert(socket, player_sn);
                }
                self.by_account.insert(account, player_sn);
                true
            }
            Err(e) => {
                error!("🔴 Failed to add player {}: {}", player_sn, e);
                false
            }
        }
    }

    pub fn contains(&self, player_sn: Sn) -> bool {
        self.by_player.contains_key(&player_sn)
    }

    pub fn get<'a>(&self, ctx: &'a ShardContext, player_sn: Sn) -> Option<&'a Player> {
        self.by_player.get(&player_sn).and_then(|sn| ctx.get::<Player>(*sn))
    }

    pub fn get_mut<'a>(&self, ctx: &'a mut ShardContext, player_sn: Sn) -> Option<&'a mut Player> {
        let sn = *self.by_player.get(&player_sn)?;
        ctx.get_mut::<Player>(sn)
    }

    pub fn by_socket(&self, socket: SocketKey) -> Option<Sn> {
        self.by_socket.get(&socket).copied()
    }

    pub fn by_account(&self, account: &str) -> Option<Sn> {
        self.by_account.get(account).copied()
    }

    /// Removes a player and returns its last state.
    pub fn remove(&mut self, ctx: &mut ShardContext, player_sn: Sn) -> Option<Player> {
        let component = self.by_player.remove(&player_sn)?;
        let player = ctx.get::<Player>(component).cloned();
        if let Some(player) = &player {
            if let Some(socket) = player.socket {
                self.by_socket.remove(&socket);
            }
            self.by_account.remove(&player.account);
        }
        ctx.release(component);
        player
    }

    pub fn remove_by_socket(&mut self, ctx: &mut ShardContext, socket: SocketKey) -> Option<Player> {
        let player_sn = self.by_socket(socket)?;
        self.remove(ctx, player_sn)
    }

    /// Removes every player, in player order.
    pub fn remove_all(&mut self, ctx: &mut ShardContext) -> Vec<Player> {
        let players: Vec<Sn> = self.by_player.keys().copied().collect();
        players.into_iter().filter_map(|sn| self.remove(ctx, sn)).collect()
    }

    pub fn player_sns(&self) -> Vec<Sn> {
        self.by_player.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }
}
