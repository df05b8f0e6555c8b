/*!
 * Attach/Detach Lifecycle
 *
 * Lets unrelated processes co-own one control block without any prior
 * coordination:
 *
 * - A zero-filled object (fresh from the OS) means nobody has initialized it.
 * - `init_guard` is a spinlock taken around attach and detach. There is no
 *   blocking primitive to use yet, and the critical section is tiny.
 * - Whoever moves `ref_count` from 0 to 1 constructs the primitives; whoever
 *   moves it from 1 to 0 destroys them.
 *
 * A process that dies while holding `init_guard` wedges every later opener
 * of the same name. Recovery needs a policy (timeout, owner pid probing)
 * that has not been decided, so the hazard is left visible rather than
 * papered over.
 */

use super::control::ControlBlock;
use crate::core::errors::{ChannelError, Result};
use crate::core::sync::SpinWait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};

/// Held ownership of a control block's `init_guard`
struct InitGuard<'a> {
    flag: &'a AtomicU32,
}

impl<'a> InitGuard<'a> {
    fn acquire(flag: &'a AtomicU32) -> Self {
        let mut spin = SpinWait::new();
        while flag
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin.snooze();
        }
        Self { flag }
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        // Released on every path, failures included
        self.flag.store(0, Ordering::Release);
    }
}

/// What an attacher expects the control block to describe
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExpectedLayout {
    pub unit_size: usize,
    pub region_size: usize,
}

/// How this handle joined the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attachment {
    /// This process constructed the primitives
    Initialized,
    /// The region was already live
    Joined { holders: u32 },
}

/// Register one more handle on `control`, initializing it if this is the first
pub(crate) fn attach<C: ControlBlock>(
    control: &C,
    name: &str,
    expected: ExpectedLayout,
) -> Result<Attachment> {
    let prefix = control.prefix();
    let _guard = InitGuard::acquire(&prefix.init_guard);

    let holders = prefix.ref_count.fetch_add(1, Ordering::AcqRel);
    if holders > 0 {
        if let Err(e) = verify_layout(control, name, expected) {
            prefix.ref_count.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }
        debug!("Joined ring '{}' ({} existing handles)", name, holders);
        return Ok(Attachment::Joined { holders });
    }

    // SAFETY: we hold init_guard and observed no other holder
    if let Err(e) = unsafe { control.construct() } {
        // Leave the block looking untouched so the next opener retries
        prefix.ref_count.fetch_sub(1, Ordering::AcqRel);
        return Err(e);
    }

    prefix
        .unit_size
        .store(expected.unit_size as u64, Ordering::Relaxed);
    prefix
        .region_size
        .store(expected.region_size as u64, Ordering::Relaxed);
    prefix.layout_tag.store(C::STRATEGY.tag(), Ordering::Relaxed);

    info!(
        "Initialized {} ring '{}' ({} byte units, {} byte region)",
        C::STRATEGY,
        name,
        expected.unit_size,
        expected.region_size
    );
    Ok(Attachment::Initialized)
}

/// Drop one handle's registration. Returns true if it was the last one.
pub(crate) fn detach<C: ControlBlock>(control: &C, name: &str) -> bool {
    let prefix = control.prefix();
    let _guard = InitGuard::acquire(&prefix.init_guard);

    let holders = prefix.ref_count.load(Ordering::Acquire);
    if holders == 0 {
        warn!("Detach from ring '{}' with no registered handles", name);
        return false;
    }

    prefix.ref_count.fetch_sub(1, Ordering::AcqRel);
    if holders > 1 {
        debug!("Detached from ring '{}' ({} handles remain)", name, holders - 1);
        return false;
    }

    // SAFETY: we hold init_guard and were the last holder
    unsafe { control.teardown() };
    prefix.layout_tag.store(0, Ordering::Relaxed);

    info!("Last handle detached from ring '{}', primitives destroyed", name);
    true
}

fn verify_layout<C: ControlBlock>(control: &C, name: &str, expected: ExpectedLayout) -> Result<()> {
    let prefix = control.prefix();
    let mismatch = |detail: String| ChannelError::LayoutMismatch {
        name: name.to_string(),
        detail,
    };

    let tag = prefix.layout_tag.load(Ordering::Relaxed);
    if tag != C::STRATEGY.tag() {
        return Err(mismatch(format!(
            "ring was initialized with a different strategy than {}",
            C::STRATEGY
        )));
    }

    let unit_size = prefix.unit_size.load(Ordering::Relaxed) as usize;
    if unit_size != expected.unit_size {
        return Err(mismatch(format!(
            "unit size is {}, expected {}",
            unit_size, expected.unit_size
        )));
    }

    let region_size = prefix.region_size.load(Ordering::Relaxed) as usize;
    if region_size != expected.region_size {
        return Err(mismatch(format!(
            "region size is {}, expected {}",
            region_size, expected.region_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::control::{BlockingControl, SpscControl};
    use super::*;

    const LAYOUT: ExpectedLayout = ExpectedLayout {
        unit_size: 8,
        region_size: 4096,
    };

    fn zeroed<C>() -> Box<C> {
        // SAFETY: control blocks are valid when zero-filled, like a fresh object
        unsafe { Box::new(std::mem::zeroed()) }
    }

    #[test]
    fn test_first_attacher_initializes() {
        let control = zeroed::<BlockingControl>();

        assert_eq!(
            attach(&*control, "/t", LAYOUT).unwrap(),
            Attachment::Initialized
        );
        assert_eq!(
            attach(&*control, "/t", LAYOUT).unwrap(),
            Attachment::Joined { holders: 1 }
        );
        assert_eq!(control.prefix().ref_count.load(Ordering::Relaxed), 2);
        assert_eq!(control.prefix().init_guard.load(Ordering::Relaxed), 0);

        assert!(!detach(&*control, "/t"));
        assert!(detach(&*control, "/t"));
        assert_eq!(control.prefix().ref_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_reinitializes_after_last_detach() {
        let control = zeroed::<SpscControl>();

        attach(&*control, "/t", LAYOUT).unwrap();
        control.tail.0.store(16, Ordering::Relaxed);
        assert!(detach(&*control, "/t"));

        assert_eq!(
            attach(&*control, "/t", LAYOUT).unwrap(),
            Attachment::Initialized
        );
        assert_eq!(control.tail.0.load(Ordering::Relaxed), 0);
        assert!(detach(&*control, "/t"));
    }

    #[test]
    fn test_mismatched_unit_size_rolls_back() {
        let control = zeroed::<SpscControl>();
        attach(&*control, "/t", LAYOUT).unwrap();

        let other = ExpectedLayout {
            unit_size: 16,
            ..LAYOUT
        };
        assert!(matches!(
            attach(&*control, "/t", other),
            Err(ChannelError::LayoutMismatch { .. })
        ));
        assert_eq!(control.prefix().ref_count.load(Ordering::Relaxed), 1);
        assert!(detach(&*control, "/t"));
    }

    #[test]
    fn test_detach_without_holders_is_harmless() {
        let control = zeroed::<SpscControl>();
        assert!(!detach(&*control, "/t"));
        assert_eq!(control.prefix().ref_count.load(Ordering::Relaxed), 0);
    }
}
