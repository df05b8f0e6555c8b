/*!
 * Lock-Free SPSC Ring
 *
 * Exactly one producer and one consumer per region, enforced by the caller.
 * The producer owns `tail` and every write to the data area; the consumer
 * owns `head` and every read. Each index is published with a store-release
 * after the data copy and observed with a load-acquire before touching the
 * slot, so a unit is always fully written before the other side sees it.
 *
 * Waiting spins with `SpinWait` (CPU is burned, nothing blocks in the OS).
 */

use super::control::SpscControl;
use super::ring::{RingData, RingGeometry};
use crate::core::sync::SpinWait;
use std::sync::atomic::Ordering;

pub(super) fn push(
    control: &SpscControl,
    geometry: &RingGeometry,
    data: &RingData,
    unit: &[u8],
) -> bool {
    // Only this side ever stores tail
    let tail = control.tail.0.load(Ordering::Relaxed);
    let next = geometry.next(tail);

    let mut spin = SpinWait::new();
    let mut waited = false;
    // Acquire pairs with the consumer's release of head: the slot is read out
    while next == control.head.0.load(Ordering::Acquire) {
        waited = true;
        spin.snooze();
    }

    // SAFETY: the slot at tail is outside [head, tail) and we are the only producer
    unsafe { data.write(tail, unit) };
    control.tail.0.store(next, Ordering::Release);
    waited
}

pub(super) fn pop(
    control: &SpscControl,
    geometry: &RingGeometry,
    data: &RingData,
    unit: &mut [u8],
) -> bool {
    // Only this side ever stores head
    let head = control.head.0.load(Ordering::Relaxed);

    let mut spin = SpinWait::new();
    let mut waited = false;
    // Acquire pairs with the producer's release of tail: the unit is written
    while head == control.tail.0.load(Ordering::Acquire) {
        waited = true;
        spin.snooze();
    }

    // SAFETY: the slot at head is published and we are the only consumer
    unsafe { data.read(head, unit) };
    control.head.0.store(geometry.next(head), Ordering::Release);
    waited
}
