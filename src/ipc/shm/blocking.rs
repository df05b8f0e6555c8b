/*!
 * Blocking Ring
 *
 * Mutex + two condition variables. Any number of producers and consumers,
 * in any number of processes, may share one ring: every access to `head`,
 * `tail` and the data area happens with the mutex held.
 *
 * Each side wakes a single waiter of the other kind. With several waiters
 * of the same kind the predicate is re-checked after every wakeup, so this
 * stays correct, but wake order is not wait order.
 */

use super::control::BlockingControl;
use super::ring::{RingData, RingGeometry};
use std::sync::atomic::Ordering;

pub(super) fn push(
    control: &BlockingControl,
    geometry: &RingGeometry,
    data: &RingData,
    unit: &[u8],
) -> bool {
    let mut section = control.mutex.lock();
    let mut waited = false;

    loop {
        let head = control.head.load(Ordering::Relaxed);
        let tail = control.tail.load(Ordering::Relaxed);
        if !geometry.is_full(head, tail) {
            break;
        }
        waited = true;
        control.not_full.wait(&mut section);
    }

    let tail = control.tail.load(Ordering::Relaxed);
    // SAFETY: the slot at tail is free and the mutex excludes every other writer
    unsafe { data.write(tail, unit) };
    control.tail.store(geometry.next(tail), Ordering::Relaxed);

    control.not_empty.notify_one();
    waited
}

pub(super) fn pop(
    control: &BlockingControl,
    geometry: &RingGeometry,
    data: &RingData,
    unit: &mut [u8],
) -> bool {
    let mut section = control.mutex.lock();
    let mut waited = false;

    loop {
        let head = control.head.load(Ordering::Relaxed);
        let tail = control.tail.load(Ordering::Relaxed);
        if !geometry.is_empty(head, tail) {
            break;
        }
        waited = true;
        control.not_empty.wait(&mut section);
    }

    let head = control.head.load(Ordering::Relaxed);
    // SAFETY: the slot at head was published under this same mutex
    unsafe { data.read(head, unit) };
    control.head.store(geometry.next(head), Ordering::Relaxed);

    control.not_full.notify_one();
    waited
}
