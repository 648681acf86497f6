//! Payload records exchanged between the roles of the cluster.
//!
//! All records are plain serde structs; the message id of the packet carrying them
//! is noted on each type.

use crate::player::PlayerRecord;
use serde::{Deserialize, Serialize};
use waypoint_runtime::{AppId, Position, Sn, SocketKey, WorldId};

/// `RequestWorld`: game asks the app manager for a public world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWorld {
    pub world_id: WorldId,
}

/// `QueryWorld`: game asks the app manager whether a dungeon instance still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWorld {
    pub world_id: WorldId,
    pub world_sn: Sn,
    /// The lobby asking, so the answer can find its way back.
    pub last_world_sn: Sn,
}

/// `QueryWorldRs`: the dungeon instance is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWorldRs {
    pub world_id: WorldId,
    pub world_sn: Sn,
    pub exists: bool,
}

/// `CreateWorld`: ask a space process to create a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorld {
    pub world_id: WorldId,
    /// World the requesting player is leaving, required for dungeons.
    #[serde(default)]
    pub last_world_sn: Sn,
    /// Game process the request came from, when known.
    #[serde(default)]
    pub game_app_id: Option<AppId>,
}

/// `BroadcastCreateWorld`: a world now exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastCreateWorld {
    pub world_id: WorldId,
    pub world_sn: Sn,
    #[serde(default)]
    pub last_world_sn: Sn,
}

/// `BroadcastCreateWorldProxy`: a world proxy exists in this game process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastCreateWorldProxy {
    pub world_id: WorldId,
    pub world_sn: Sn,
}

/// `WorldSyncToGather`: one world reports its online count to its space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSyncToGather {
    pub world_sn: Sn,
    pub online: u32,
}

/// `LoginGame`: client login into the game lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGame {
    pub account: String,
    pub player_sn: Sn,
}

/// `QueryPlayer`: lobby asks the db role for a player record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlayer {
    pub account: String,
    pub player_sn: Sn,
}

/// `QueryPlayerRs` and `SavePlayer`: a full player record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub account: String,
    pub record: PlayerRecord,
}

/// `Teleport`: hand a player session to the proxy of another world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teleport {
    pub last_world_sn: Sn,
    pub account: String,
    pub socket: SocketKey,
    pub record: PlayerRecord,
}

/// `TeleportAfter`: the target took the player over, the previous owner drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportAfter {
    pub player_sn: Sn,
}

/// `TeleportFailed`: sent to the client when a transfer is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportFailed {
    pub world_id: WorldId,
    pub reason: String,
}

/// `EnterWorld` (client request) and `EnterWorldNotice` (space answer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterWorld {
    pub world_id: WorldId,
    #[serde(default)]
    pub world_sn: Sn,
    #[serde(default)]
    pub position: Position,
}

/// `SyncPlayerToSpace` and `SyncPlayerToGame`: the serialized player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlayer {
    pub account: String,
    #[serde(default)]
    pub socket: Option<SocketKey>,
    pub record: PlayerRecord,
}

/// `RequestSyncPlayer` and `RemovePlayer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub player_sn: Sn,
}

/// `Move`: a client moved inside its world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub player_sn: Sn,
    pub position: Position,
}
