/*!
 * Synchronization Primitives
 *
 * Process-shared primitives for state that lives in mapped memory:
 * - `ProcessMutex` / `CriticalSection` for scoped mutual exclusion
 * - `ProcessCondvar` for monitor-style wait/notify
 * - `SpinWait` for cooperative busy-waiting on atomics
 *
 * # Architecture
 *
 * The mutex and condition variable wrap pthread objects configured with
 * `PTHREAD_PROCESS_SHARED`, so independent mappings of one object observe
 * the same lock state. They are never constructed in process-local memory
 * by the channel code: they are initialized in place, exactly once, inside
 * a shared region and torn down by its last holder.
 *
 * # Failure Model
 *
 * `init`/`destroy` surface the OS error code. `lock`, `unlock`, `wait` and
 * `notify_one` cannot fail under correct usage and abort the caller with a
 * panic if the OS reports otherwise.
 */

mod condvar;
mod mutex;
mod spinwait;

pub use condvar::ProcessCondvar;
pub use mutex::{CriticalSection, ProcessMutex};
pub use spinwait::SpinWait;

use crate::core::errors::{ChannelError, Result};
use nix::errno::Errno;

/// Map a pthread return code to a setup error
#[inline]
pub(crate) fn check_init(op: &'static str, code: libc::c_int) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(ChannelError::SyncInit {
            op,
            source: Errno::from_raw(code),
        })
    }
}

/// Abort on a pthread failure that correct usage never produces
#[cold]
#[inline(never)]
pub(crate) fn fatal(op: &'static str, code: libc::c_int) -> ! {
    let errno = Errno::from_raw(code);
    log::error!("{} failed: {}", op, errno);
    panic!("{} failed: {}", op, errno);
}
