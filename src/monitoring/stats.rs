/*!
 * Channel Statistics
 * Per-handle transfer counters with a serializable snapshot
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of one handle's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelStats {
    pub units_pushed: u64,
    pub units_popped: u64,
    pub bytes_pushed: u64,
    pub bytes_popped: u64,
    /// Pushes that found the ring full and had to wait
    pub push_waits: u64,
    /// Pops that found the ring empty and had to wait
    pub pop_waits: u64,
}

impl ChannelStats {
    /// Units this handle pushed but did not pop itself
    #[inline]
    pub fn net_units(&self) -> i64 {
        self.units_pushed as i64 - self.units_popped as i64
    }
}

/// Counters owned by a single handle
///
/// Process-local: handles attached to the same endpoint count separately.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    units_pushed: AtomicU64,
    units_popped: AtomicU64,
    bytes_pushed: AtomicU64,
    bytes_popped: AtomicU64,
    push_waits: AtomicU64,
    pop_waits: AtomicU64,
}

impl ChannelCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn record_push(&self, bytes: usize, waited: bool) {
        self.units_pushed.fetch_add(1, Ordering::Relaxed);
        self.bytes_pushed.fetch_add(bytes as u64, Ordering::Relaxed);
        if waited {
            self.push_waits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn record_pop(&self, bytes: usize, waited: bool) {
        self.units_popped.fetch_add(1, Ordering::Relaxed);
        self.bytes_popped.fetch_add(bytes as u64, Ordering::Relaxed);
        if waited {
            self.pop_waits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            units_pushed: self.units_pushed.load(Ordering::Relaxed),
            units_popped: self.units_popped.load(Ordering::Relaxed),
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
            bytes_popped: self.bytes_popped.load(Ordering::Relaxed),
            push_waits: self.push_waits.load(Ordering::Relaxed),
            pop_waits: self.pop_waits.load(Ordering::Relaxed),
        }
    }
}
