//! Shutdown coordination between the shard threads and the process driver.
//!
//! Shutdown runs in two phases: once initiated, shards stop waiting for new work and
//! drain what is already queued; once complete, the driver tears the process down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared shutdown flags, cheap to clone into every shard thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    /// Shards stop their tick loop and drain their queues
    shutdown_initiated: Arc<AtomicBool>,
    /// Every shard has drained and exited
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    pub fn initiate_shutdown(&self) {
        self.shutdown_initiated.store(true, Ordering::Release);
        info!("🛑 Shutdown initiated - shards are draining their queues");
    }

    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ All shards drained - ready for final cleanup");
    }
}
