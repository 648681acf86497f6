//! Error types of the shard runtime.

use crate::types::{AppKey, Sn, SocketKey};
use thiserror::Error;

/// Failures when encoding or decoding packet payloads.
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Payload encoding failed for {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Payload decoding failed for {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Contract violations detected by a component pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Serial number {0} is already live in this pool")]
    DuplicateSn(Sn),
    #[error("Serial number {0} is not held by this pool")]
    UnknownSn(Sn),
    #[error("Serial number {0} was released twice")]
    DoubleRelease(Sn),
    #[error("Component {0} is not in a state that allows this operation")]
    InvalidState(Sn),
}

/// Delivery failures reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No route to app {0}")]
    Unreachable(AppKey),
    #[error("Client {0} is not connected")]
    ClientGone(SocketKey),
    #[error("Nothing listens on endpoint {0}")]
    UnknownEndpoint(String),
    #[error("Transport closed")]
    Closed,
}

/// Errors surfaced by the runtime and by message handlers.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("App id {0} exceeds the 10-bit serial number field")]
    AppIdOutOfRange(u32),
    #[error("Component {component} is already attached to {parent}")]
    DuplicateComponent { component: &'static str, parent: Sn },
    #[error("Missing routing tag '{0}'")]
    MissingTag(&'static str),
    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Result type of message handlers.
pub type HandlerResult = Result<(), RuntimeError>;
