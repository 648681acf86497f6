//! Error types of the cluster roles.
//!
//! Handler failures stay inside the runtime (they are logged per packet). The errors
//! here surface while assembling nodes and clusters or while parsing operator input.

use waypoint_runtime::{AppKey, PacketError, RuntimeError, TransportError};

/// Failures while building or driving a cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Runtime errors such as spawning a component with a taken serial number
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Transport errors raised by the in-process network
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Console input that does not name a known command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Inconsistent settings, for instance two processes sharing an app id
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No process {0} in this cluster")]
    UnknownApp(AppKey),

    /// A shard thread that could not be spawned
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
