/*!
 * System Limits and Constants
 *
 * Centralized location for channel sizing, alignment and retry constants.
 * Organized by domain for maintainability and discoverability.
 *
 * - Performance-critical constants are marked with [PERF]
 * - Linux-compatible values are marked with [LINUX-COMPAT]
 */

use std::time::Duration;

// =============================================================================
// SHARED MEMORY REGION
// =============================================================================

/// Virtual page size assumed when sizing regions
pub const VIRTUAL_PAGE_SIZE: usize = 4096;

/// Default size of one shared ring region (1GB, control block + data area)
/// The backing object is sparse, untouched pages cost nothing
pub const DEFAULT_REGION_SIZE: usize = 262_144 * VIRTUAL_PAGE_SIZE;

/// Padding for the SPSC indices and alignment of the data area
/// [PERF] 128 covers adjacent-line prefetching on x86_64 and the 128-byte lines on apple silicon
pub const CACHE_LINE_PAD: usize = 128;

/// Longest shared memory object name accepted by shm_open
/// [LINUX-COMPAT] NAME_MAX
pub const SHM_NAME_MAX: usize = 255;

/// How long an opener waits for another process to size a new object
pub const SHM_SIZE_WAIT: Duration = Duration::from_millis(500);

// =============================================================================
// SPIN WAITING
// =============================================================================

/// Iterations of pure `spin_loop` before yielding the processor
/// [PERF] Keeps wake latency low when the peer is about to publish
pub const SPIN_LIMIT: u32 = 6;

// =============================================================================
// SOCKET TRANSPORT
// =============================================================================

/// Capacity of `sockaddr_un.sun_path`, including the trailing NUL
/// [LINUX-COMPAT] 108 on Linux, 104 on the BSDs and macOS
pub const SOCKET_PATH_MAX: usize =
    std::mem::size_of::<libc::sockaddr_un>() - std::mem::offset_of!(libc::sockaddr_un, sun_path);

/// Connect attempts made by the connecting side before giving up
pub const DEFAULT_CONNECT_RETRIES: u32 = 50;

/// Delay between connect attempts
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_millis(20);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_is_page_multiple() {
        assert_eq!(DEFAULT_REGION_SIZE % VIRTUAL_PAGE_SIZE, 0);
        assert!(CACHE_LINE_PAD.is_power_of_two());
    }

    #[test]
    fn test_socket_path_max() {
        assert!(SOCKET_PATH_MAX >= 100);
        assert!(SOCKET_PATH_MAX <= 108);
    }
}
