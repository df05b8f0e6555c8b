/*!
 * Process-Shared Mutex
 *
 * pthread mutex configured for use across address spaces
 */

use super::{check_init, fatal};
use crate::core::errors::Result;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// Mutex that lives in shared memory
///
/// # Layout
/// `#[repr(C)]` so every process agrees on its offset inside a control block.
#[repr(C)]
pub struct ProcessMutex {
    raw: UnsafeCell<libc::pthread_mutex_t>,
}

// SAFETY: the pthread object is initialized with PTHREAD_PROCESS_SHARED and
// all access goes through the pthread API, which does its own synchronization.
unsafe impl Send for ProcessMutex {}
unsafe impl Sync for ProcessMutex {}

impl ProcessMutex {
    /// Initialize the mutex in place with the process-shared attribute
    ///
    /// # Safety
    /// `self` must not be initialized already, and no other thread or process
    /// may use it until this returns.
    pub unsafe fn init(&self) -> Result<()> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check_init("mutexattr", libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;

        let result = check_init(
            "mutexattr",
            libc::pthread_mutexattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED),
        )
        .and_then(|()| {
            check_init(
                "mutex",
                libc::pthread_mutex_init(self.raw.get(), attr.as_ptr()),
            )
        });

        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        result
    }

    /// Destroy the underlying pthread object
    ///
    /// # Safety
    /// The mutex must be initialized, unlocked, and unused by every process.
    pub unsafe fn destroy(&self) -> Result<()> {
        check_init("mutex destroy", libc::pthread_mutex_destroy(self.raw.get()))
    }

    /// Acquire the mutex, releasing it when the returned section drops
    #[inline]
    pub fn lock(&self) -> CriticalSection<'_> {
        // SAFETY: reachable only through an initialized control block
        let code = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        if code != 0 {
            fatal("pthread_mutex_lock", code);
        }
        CriticalSection { mutex: self }
    }

    #[inline(always)]
    pub(super) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.raw.get()
    }
}

/// Scoped ownership of a [`ProcessMutex`]
///
/// Unlocks on every exit path, early returns and unwinding included.
pub struct CriticalSection<'a> {
    mutex: &'a ProcessMutex,
}

impl CriticalSection<'_> {
    #[inline(always)]
    pub(super) fn mutex(&self) -> &ProcessMutex {
        self.mutex
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        // SAFETY: this section holds the lock
        let code = unsafe { libc::pthread_mutex_unlock(self.mutex.raw()) };
        if code != 0 {
            fatal("pthread_mutex_unlock", code);
        }
    }
}
