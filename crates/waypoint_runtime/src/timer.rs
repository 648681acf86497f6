//! Per-shard timers.
//!
//! A timer does not hold a callback: when it fires it produces a packet with its
//! message id, addressed to the owner, which the shard dispatches like any other
//! message. Releasing the owner removes its timers.

use crate::packet::{MsgId, Packet, RoutingTags};
use crate::types::Sn;

#[derive(Debug, Clone)]
struct Timer {
    owner: Sn,
    msg_id: MsgId,
    due_ms: u64,
    interval_ms: u64,
    repeat: bool,
}

/// Timers of one shard.
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: Vec<Timer>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `msg_id` for `owner`, first after `delay_ms`, then every `interval_ms`
    /// when `repeat` is set.
    pub fn add(&mut self, owner: Sn, msg_id: MsgId, now_ms: u64, delay_ms: u64, interval_ms: u64, repeat: bool) {
        self.timers.push(Timer {
            owner,
            msg_id,
            due_ms: now_ms + delay_ms,
            interval_ms: interval_ms.max(1),
            repeat,
        });
    }

    pub fn remove_owner(&mut self, owner: Sn) -> usize {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.owner != owner);
        before - self.timers.len()
    }

    /// Collects the packets of every timer due at `now_ms` and reschedules repeating ones.
    pub fn due(&mut self, now_ms: u64) -> Vec<Packet> {
        let mut fired = Vec::new();
        self.timers.retain_mut(|timer| {
            if timer.due_ms > now_ms {
                return true;
            }
            fired.push(Packet::empty(timer.msg_id).with_tags(RoutingTags::default().entity(timer.owner)));
            if timer.repeat {
                while timer.due_ms <= now_ms {
                    timer.due_ms += timer.interval_ms;
                }
                true
            } else {
                false
            }
        });
        fired
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
