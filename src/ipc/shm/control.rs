/*!
 * Ring Control Blocks
 *
 * Layouts of the state that sits at the start of every shared region.
 * Both layouts begin with the same `ControlPrefix`, so an attacher can read
 * the recorded strategy before trusting anything else.
 */

use super::ring::{RingData, RingGeometry};
use crate::core::errors::Result;
use crate::core::limits::CACHE_LINE_PAD;
use crate::core::sync::{ProcessCondvar, ProcessMutex};
use crate::core::types::RingStrategy;
use log::warn;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Attach/detach bookkeeping shared by every layout
///
/// Always accessed atomically, whichever ring strategy is in use.
#[repr(C)]
pub(crate) struct ControlPrefix {
    /// 0 = free, 1 = a process is initializing or tearing down
    pub init_guard: AtomicU32,
    /// Live handles across all processes
    pub ref_count: AtomicU32,
    /// `RingStrategy::tag` of the initializer, 0 before first initialization
    pub layout_tag: AtomicU32,
    _pad: u32,
    pub unit_size: AtomicU64,
    pub region_size: AtomicU64,
}

/// A control block layout and the ring algorithm that goes with it
///
/// # Safety
/// Implementors must be `#[repr(C)]`, start with a `ControlPrefix`, and be
/// valid when zero-filled (a fresh shared memory object).
pub(crate) unsafe trait ControlBlock: Sync + Sized {
    const STRATEGY: RingStrategy;

    fn prefix(&self) -> &ControlPrefix;

    /// First-time construction by the process that saw the 0 -> 1 transition
    ///
    /// # Safety
    /// Caller holds `init_guard` and no other handle is attached.
    unsafe fn construct(&self) -> Result<()>;

    /// Release OS objects on the 1 -> 0 transition
    ///
    /// # Safety
    /// Caller holds `init_guard` and was the last attached handle.
    unsafe fn teardown(&self);

    /// Copy one unit in, waiting for space. Returns true if it had to wait.
    fn push(&self, geometry: &RingGeometry, data: &RingData, unit: &[u8]) -> bool;

    /// Copy one unit out, waiting for data. Returns true if it had to wait.
    fn pop(&self, geometry: &RingGeometry, data: &RingData, unit: &mut [u8]) -> bool;

    /// Occupied units at the time of the call
    fn occupancy(&self, geometry: &RingGeometry) -> usize;
}

/// Offset of the data area: the control block rounded up to `CACHE_LINE_PAD`
#[inline]
pub(crate) const fn data_offset<C: ControlBlock>() -> usize {
    let size = std::mem::size_of::<C>();
    (size + CACHE_LINE_PAD - 1) & !(CACHE_LINE_PAD - 1)
}

/// Control block of the blocking ring
///
/// `head` and `tail` are only read or written with `mutex` held; they are
/// atomics so the mapped memory is never aliased as plain data.
#[repr(C)]
pub(crate) struct BlockingControl {
    prefix: ControlPrefix,
    pub mutex: ProcessMutex,
    pub not_full: ProcessCondvar,
    pub not_empty: ProcessCondvar,
    pub head: AtomicUsize,
    pub tail: AtomicUsize,
}

/// A ring index alone on its cache line
#[repr(C, align(128))]
pub(crate) struct PaddedIndex(pub AtomicUsize);

const _: () = assert!(std::mem::align_of::<PaddedIndex>() == CACHE_LINE_PAD);

/// Control block of the lock-free SPSC ring
///
/// The producer owns `tail`, the consumer owns `head`.
#[repr(C)]
pub(crate) struct SpscControl {
    prefix: ControlPrefix,
    pub head: PaddedIndex,
    pub tail: PaddedIndex,
}

unsafe impl ControlBlock for BlockingControl {
    const STRATEGY: RingStrategy = RingStrategy::Blocking;

    #[inline(always)]
    fn prefix(&self) -> &ControlPrefix {
        &self.prefix
    }

    unsafe fn construct(&self) -> Result<()> {
        self.mutex.init()?;

        if let Err(e) = self.not_empty.init() {
            let _ = self.mutex.destroy();
            return Err(e);
        }

        if let Err(e) = self.not_full.init() {
            let _ = self.not_empty.destroy();
            let _ = self.mutex.destroy();
            return Err(e);
        }

        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
        Ok(())
    }

    unsafe fn teardown(&self) {
        if let Err(e) = self.mutex.destroy() {
            warn!("Destroying ring mutex: {}", e);
        }
        if let Err(e) = self.not_empty.destroy() {
            warn!("Destroying not-empty condvar: {}", e);
        }
        if let Err(e) = self.not_full.destroy() {
            warn!("Destroying not-full condvar: {}", e);
        }
    }

    fn push(&self, geometry: &RingGeometry, data: &RingData, unit: &[u8]) -> bool {
        super::blocking::push(self, geometry, data, unit)
    }

    fn pop(&self, geometry: &RingGeometry, data: &RingData, unit: &mut [u8]) -> bool {
        super::blocking::pop(self, geometry, data, unit)
    }

    fn occupancy(&self, geometry: &RingGeometry) -> usize {
        let _section = self.mutex.lock();
        geometry.occupied(
            self.head.load(Ordering::Relaxed),
            self.tail.load(Ordering::Relaxed),
        )
    }
}

unsafe impl ControlBlock for SpscControl {
    const STRATEGY: RingStrategy = RingStrategy::Spsc;

    #[inline(always)]
    fn prefix(&self) -> &ControlPrefix {
        &self.prefix
    }

    unsafe fn construct(&self) -> Result<()> {
        self.head.0.store(0, Ordering::Relaxed);
        self.tail.0.store(0, Ordering::Relaxed);
        Ok(())
    }

    unsafe fn teardown(&self) {}

    fn push(&self, geometry: &RingGeometry, data: &RingData, unit: &[u8]) -> bool {
        super::spsc::push(self, geometry, data, unit)
    }

    fn pop(&self, geometry: &RingGeometry, data: &RingData, unit: &mut [u8]) -> bool {
        super::spsc::pop(self, geometry, data, unit)
    }

    fn occupancy(&self, geometry: &RingGeometry) -> usize {
        geometry.occupied(
            self.head.0.load(Ordering::Acquire),
            self.tail.0.load(Ordering::Acquire),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_offset_alignment() {
        assert_eq!(data_offset::<BlockingControl>() % CACHE_LINE_PAD, 0);
        assert_eq!(data_offset::<SpscControl>() % CACHE_LINE_PAD, 0);
        assert!(data_offset::<BlockingControl>() >= std::mem::size_of::<BlockingControl>());
    }

    #[test]
    fn test_spsc_indices_on_separate_lines() {
        let head = std::mem::offset_of!(SpscControl, head);
        let tail = std::mem::offset_of!(SpscControl, tail);
        assert!(tail - head >= CACHE_LINE_PAD);
        assert_eq!(head % CACHE_LINE_PAD, 0);
    }

    #[test]
    fn test_prefix_at_offset_zero() {
        assert_eq!(std::mem::offset_of!(BlockingControl, prefix), 0);
        assert_eq!(std::mem::offset_of!(SpscControl, prefix), 0);
    }
}
