/*!
 * Process-Shared Condition Variable
 *
 * pthread condition variable paired with a `ProcessMutex`
 */

use super::mutex::CriticalSection;
use super::{check_init, fatal};
use crate::core::errors::Result;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// Condition variable that lives in shared memory
#[repr(C)]
pub struct ProcessCondvar {
    raw: UnsafeCell<libc::pthread_cond_t>,
}

// SAFETY: see ProcessMutex
unsafe impl Send for ProcessCondvar {}
unsafe impl Sync for ProcessCondvar {}

impl ProcessCondvar {
    /// Initialize the condition variable in place with the process-shared attribute
    ///
    /// # Safety
    /// `self` must not be initialized already, and no other thread or process
    /// may use it until this returns.
    pub unsafe fn init(&self) -> Result<()> {
        let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        check_init("condattr", libc::pthread_condattr_init(attr.as_mut_ptr()))?;

        let result = check_init(
            "condattr",
            libc::pthread_condattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED),
        )
        .and_then(|()| check_init("condvar", libc::pthread_cond_init(self.raw.get(), attr.as_ptr())));

        libc::pthread_condattr_destroy(attr.as_mut_ptr());
        result
    }

    /// # Safety
    /// The condition variable must be initialized and have no waiters in any process.
    pub unsafe fn destroy(&self) -> Result<()> {
        check_init("condvar destroy", libc::pthread_cond_destroy(self.raw.get()))
    }

    /// Atomically release the section's mutex and sleep until notified
    ///
    /// The mutex is held again when this returns. Wakeups may be spurious,
    /// callers re-check their predicate in a loop.
    #[inline]
    pub fn wait(&self, section: &mut CriticalSection<'_>) {
        // SAFETY: the section proves the calling thread holds the mutex
        let code = unsafe { libc::pthread_cond_wait(self.raw.get(), section.mutex().raw()) };
        if code != 0 {
            fatal("pthread_cond_wait", code);
        }
    }

    /// Wake at most one waiter
    #[inline]
    pub fn notify_one(&self) {
        let code = unsafe { libc::pthread_cond_signal(self.raw.get()) };
        if code != 0 {
            fatal("pthread_cond_signal", code);
        }
    }
}
