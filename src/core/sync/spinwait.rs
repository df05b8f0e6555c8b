/*!
 * Cooperative Spin-Wait
 *
 * Short exponential spinning followed by yielding the processor.
 *
 * 1. **Spin phase** (first `SPIN_LIMIT` rounds): `spin_loop()` hints, doubling each round
 * 2. **Yield phase**: `yield_now()` on every call
 *
 * There is deliberately no park phase: the waiters using this have no OS
 * object to block on, so they never sleep.
 */

use crate::core::limits::SPIN_LIMIT;
use std::hint;
use std::thread;

/// Backoff state for one wait loop
#[derive(Debug, Default)]
pub struct SpinWait {
    step: u32,
}

impl SpinWait {
    #[inline]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Back off once
    #[inline]
    pub fn snooze(&mut self) {
        if self.step < SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    /// Whether spinning has escalated to yielding
    #[inline]
    pub fn is_yielding(&self) -> bool {
        self.step >= SPIN_LIMIT
    }

    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
