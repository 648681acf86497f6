//! Operator console commands.
//!
//! Each command becomes a packet queued on every shard; the components owning the
//! relevant state log what they know.

use crate::error::ClusterError;
use crate::node::LocalDelivery;
use std::sync::Arc;
use tracing::{info, warn};
use waypoint_runtime::{MsgId, Packet};

/// Commands understood by the console, with their help lines.
pub const COMMANDS: [(&str, &str); 4] = [
    ("world", "online counts of the worlds hosted by each space"),
    ("app", "load table of the known processes"),
    ("create", "worlds being created and created by the app manager"),
    ("pool", "component pool usage of every shard"),
];

/// Turns one console line into the packet to broadcast.
pub fn parse_command(line: &str) -> Result<Packet, ClusterError> {
    let msg_id = match line.trim().to_ascii_lowercase().as_str() {
        "world" => MsgId::CmdWorld,
        "app" => MsgId::CmdApp,
        "create" => MsgId::CmdCreate,
        "pool" => MsgId::CmdPool,
        other => return Err(ClusterError::UnknownCommand(other.to_string())),
    };
    Ok(Packet::empty(msg_id))
}

pub fn help() -> String {
    COMMANDS
        .iter()
        .map(|(name, about)| format!("  {:<8}{}", name, about))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Broadcasts console commands to the shards of every node.
#[derive(Clone)]
pub struct ConsoleSink {
    targets: Vec<Arc<LocalDelivery>>,
}

impl ConsoleSink {
    pub fn new(targets: Vec<Arc<LocalDelivery>>) -> Self {
        Self { targets }
    }

    /// Packets queued on the shards and not yet dispatched.
    pub fn pending(&self) -> usize {
        self.targets.iter().map(|target| target.pending()).sum()
    }

    /// Parses `line` and queues the command everywhere. Returns false for unknown input.
    pub fn submit(&self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        match parse_command(line) {
            Ok(packet) => {
                info!("⌨️ Console command '{}' sent to {} nodes", line.trim(), self.targets.len());
                for target in &self.targets {
                    target.deliver(packet.clone());
                }
                true
            }
            Err(e) => {
                warn!("⌨️ {}\n{}", e, help());
                false
            }
        }
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").field("targets", &self.targets.len()).finish()
    }
}
