//! Double-buffered inbound queue of a shard.
//!
//! Producers on any thread push into the write buffer under a short lock. Once per
//! tick the owning shard swaps the write buffer with its (empty) read buffer and
//! drains it without holding the lock, preserving enqueue order.

use crate::packet::Packet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Multi-producer, single-consumer packet queue.
///
/// Packets are shared through `Arc` so that one inbound packet can be queued on
/// every shard of a process and stays alive until the last shard handled it.
#[derive(Debug, Default)]
pub struct PacketQueue {
    pending: Mutex<Vec<Arc<Packet>>>,
    enqueued: AtomicU64,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, packet: Arc<Packet>) {
        self.pending.lock().push(packet);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Swaps the write buffer into `read`, which must be drained by the caller.
    pub fn swap_into(&self, read: &mut Vec<Arc<Packet>>) {
        debug_assert!(read.is_empty(), "read buffer swapped before being drained");
        std::mem::swap(&mut *self.pending.lock(), read);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Total packets ever pushed.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }
}
