/*!
 * Ring Geometry
 *
 * Index arithmetic and the flat data area shared by both ring strategies.
 * `head` is the next read offset, `tail` the next write offset; both are byte
 * offsets that stay in `[0, capacity)` and are multiples of the unit size.
 * One slot always stays free so that empty (`head == tail`) and full
 * (`next(tail) == head`) are distinguishable.
 */

use crate::core::errors::{ChannelError, Result};
use std::ptr::{self, NonNull};

/// Sizes of one ring, identical in every attached process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    unit: usize,
    capacity: usize,
}

impl RingGeometry {
    /// Lay out a ring in `region_size` bytes behind a `header_size`-byte control block
    ///
    /// The data area is truncated down to a multiple of `unit`.
    pub fn new(region_size: usize, header_size: usize, unit: usize) -> Result<Self> {
        debug_assert!(unit.is_power_of_two());

        let raw = region_size.saturating_sub(header_size);
        let capacity = raw - raw % unit;

        if capacity < 2 * unit {
            return Err(ChannelError::RegionTooSmall {
                region_size,
                unit_size: unit,
                header_size,
            });
        }

        Ok(Self { unit, capacity })
    }

    #[inline(always)]
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Data area size in bytes
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units that fit before the ring reports full
    #[inline]
    pub fn usable_units(&self) -> usize {
        self.capacity / self.unit - 1
    }

    #[inline(always)]
    pub fn next(&self, offset: usize) -> usize {
        let next = offset + self.unit;
        if next == self.capacity {
            0
        } else {
            next
        }
    }

    #[inline(always)]
    pub fn is_empty(&self, head: usize, tail: usize) -> bool {
        head == tail
    }

    #[inline(always)]
    pub fn is_full(&self, head: usize, tail: usize) -> bool {
        self.next(tail) == head
    }

    /// Occupied units for a given pair of indices
    #[inline]
    pub fn occupied(&self, head: usize, tail: usize) -> usize {
        let bytes = if tail >= head {
            tail - head
        } else {
            self.capacity - head + tail
        };
        bytes / self.unit
    }
}

/// View of the data area inside a mapped region
pub struct RingData {
    base: NonNull<u8>,
    capacity: usize,
}

impl RingData {
    /// # Safety
    /// `base` must point to at least `capacity` bytes that stay mapped for
    /// the lifetime of this value.
    pub(crate) unsafe fn new(base: NonNull<u8>, capacity: usize) -> Self {
        Self { base, capacity }
    }

    /// Copy `unit` into the slot at `offset`
    ///
    /// # Safety
    /// The caller must own the slot: it is outside `[head, tail)` and no other
    /// writer can touch it concurrently.
    #[inline(always)]
    pub(crate) unsafe fn write(&self, offset: usize, unit: &[u8]) {
        debug_assert!(offset + unit.len() <= self.capacity);
        ptr::copy_nonoverlapping(unit.as_ptr(), self.base.as_ptr().add(offset), unit.len());
    }

    /// Copy the slot at `offset` into `unit`
    ///
    /// # Safety
    /// The slot must hold a fully published unit that no writer can touch
    /// until the caller advances `head`.
    #[inline(always)]
    pub(crate) unsafe fn read(&self, offset: usize, unit: &mut [u8]) {
        debug_assert!(offset + unit.len() <= self.capacity);
        ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), unit.as_mut_ptr(), unit.len());
    }
}
