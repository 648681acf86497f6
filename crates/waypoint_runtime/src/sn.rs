//! Serial number generation.
//!
//! A serial number packs the creation time (1024 ms slices), the creating app id
//! (10 bits) and a per-slice ticket (16 bits). When the ticket space of a slice is
//! exhausted the generator moves on to the next slice, so numbers stay unique and
//! monotonic even under bursts.

use crate::clock::now_ms;
use crate::error::RuntimeError;
use crate::types::{AppId, Sn};
use parking_lot::Mutex;
use tracing::warn;

const APP_ID_BITS: u32 = 10;
const TICKET_BITS: u32 = 16;
const TICKET_MAX: u64 = (1 << TICKET_BITS) - 1;

#[derive(Debug)]
struct SnState {
    slice: u64,
    ticket: u64,
}

/// Thread-safe generator of process-unique serial numbers.
#[derive(Debug)]
pub struct SnGenerator {
    app_id: AppId,
    state: Mutex<SnState>,
}

impl SnGenerator {
    /// Creates a generator for the given app id.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AppIdOutOfRange`] when `app_id` does not fit in 10 bits.
    pub fn new(app_id: AppId) -> Result<Self, RuntimeError> {
        if u32::from(app_id) >= 1 << APP_ID_BITS {
            return Err(RuntimeError::AppIdOutOfRange(u32::from(app_id)));
        }
        Ok(Self {
            app_id,
            state: Mutex::new(SnState { slice: 0, ticket: 0 }),
        })
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Generates a serial number from the wall clock.
    pub fn generate(&self) -> Sn {
        self.generate_at(now_ms())
    }

    /// Generates a serial number for the given time in milliseconds.
    pub fn generate_at(&self, now_ms: u64) -> Sn {
        let mut state = self.state.lock();
        let slice = now_ms >> 10;
        if slice > state.slice {
            state.slice = slice;
            state.ticket = 0;
        }

        state.ticket += 1;
        if state.ticket > TICKET_MAX {
            warn!("⚠️ Serial number tickets exhausted in slice {}, borrowing the next slice", state.slice);
            state.slice += 1;
            state.ticket = 1;
        }

        Sn((state.slice << (APP_ID_BITS + TICKET_BITS)) | (u64::from(self.app_id) << TICKET_BITS) | state.ticket)
    }
}
