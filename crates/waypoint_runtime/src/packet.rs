//! # Packets and Routing Tags
//!
//! Every message moving between shards, processes and clients is a [`Packet`]: a
//! [`MsgId`], a set of [`RoutingTags`] and an opaque payload decoded on demand by
//! the handler that consumes it.
//!
//! ## Routing tags
//!
//! - **account**: the client account a packet originates from
//! - **app**: the process a packet came from (stamped by the transport) or is bound to
//! - **entity**: the owner serial number the packet is addressed to
//! - **player**: the player serial number the packet concerns
//! - **to_world**: set when a packet was relayed towards a world, disables default fallback
//! - **socket**: the client connection a packet came from or goes to

use crate::error::PacketError;
use crate::types::{AppKey, Sn, SocketKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Identifier of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MsgId {
    // Network lifecycle
    NetworkConnect,
    NetworkDisconnect,
    NetworkListenKey,
    AppRegister,
    AppInfoSync,

    // Console
    CmdWorld,
    CmdApp,
    CmdCreate,
    CmdPool,

    // World lifecycle
    RequestWorld,
    QueryWorld,
    QueryWorldRs,
    CreateWorld,
    BroadcastCreateWorld,
    BroadcastCreateWorldProxy,
    WorldSyncToGather,

    // Player session
    LoginGame,
    QueryPlayer,
    QueryPlayerRs,
    SavePlayer,
    Teleport,
    TeleportAfter,
    TeleportFailed,
    EnterWorld,
    EnterWorldNotice,
    SyncPlayerToSpace,
    RequestSyncPlayer,
    SyncPlayerToGame,
    RemovePlayer,
    Move,

    // Timers
    TimerWorldSync,
    TimerAppSync,
    TimerTeleportSweep,
    TimerLobbySweep,
    TimerReconnect,
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Routing metadata carried by a packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Sn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Sn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_world: Option<Sn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<SocketKey>,
}

impl RoutingTags {
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn app(mut self, app: AppKey) -> Self {
        self.app = Some(app);
        self
    }

    /// Addresses the packet to one owner. A null serial number clears the tag.
    pub fn entity(mut self, sn: Sn) -> Self {
        self.entity = (!sn.is_null()).then_some(sn);
        self
    }

    pub fn player(mut self, sn: Sn) -> Self {
        self.player = (!sn.is_null()).then_some(sn);
        self
    }

    pub fn to_world(mut self, sn: Sn) -> Self {
        self.to_world = (!sn.is_null()).then_some(sn);
        self
    }

    pub fn socket(mut self, socket: SocketKey) -> Self {
        self.socket = Some(socket);
        self
    }
}

/// Trait implemented by every payload record.
///
/// Any `Serialize + DeserializeOwned + Debug` type is a payload through the blanket
/// implementation; encoding uses JSON.
pub trait Payload: Sized {
    fn encode(&self) -> Result<Vec<u8>, PacketError>;
    fn decode(data: &[u8]) -> Result<Self, PacketError>;
}

impl<T> Payload for T
where
    T: Serialize + DeserializeOwned + fmt::Debug,
{
    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        serde_json::to_vec(self).map_err(|source| {
            tracing::error!(
                "🔴 Payload encoding failed for type '{}': {} (payload: {:?})",
                std::any::type_name::<T>(),
                source,
                self
            );
            PacketError::Encode {
                type_name: std::any::type_name::<T>(),
                source,
            }
        })
    }

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        serde_json::from_slice(data).map_err(|source| {
            let preview = if data.len() > 200 {
                format!(
                    "{}... (truncated {} bytes)",
                    String::from_utf8_lossy(&data[..200]),
                    data.len() - 200
                )
            } else {
                String::from_utf8_lossy(data).to_string()
            };
            tracing::error!(
                "🔴 Payload decoding failed for type '{}': {} (data length: {} bytes, content preview: '{}')",
                std::any::type_name::<T>(),
                source,
                data.len(),
                preview
            );
            PacketError::Decode {
                type_name: std::any::type_name::<T>(),
                source,
            }
        })
    }
}

/// A typed message with routing tags and an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub msg_id: MsgId,
    #[serde(default)]
    pub tags: RoutingTags,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Packet {
    /// Creates a packet with an encoded payload and no tags.
    pub fn new<T: Payload>(msg_id: MsgId, payload: &T) -> Result<Self, PacketError> {
        Ok(Self {
            msg_id,
            tags: RoutingTags::default(),
            payload: payload.encode()?,
        })
    }

    /// Creates a packet without payload.
    pub fn empty(msg_id: MsgId) -> Self {
        Self {
            msg_id,
            tags: RoutingTags::default(),
            payload: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: RoutingTags) -> Self {
        self.tags = tags;
        self
    }

    /// Decodes the payload as `T`.
    pub fn decode<T: Payload>(&self) -> Result<T, PacketError> {
        T::decode(&self.payload)
    }
}
