/*!
 * Shared Memory Transport
 *
 * A ring of fixed-size units inside one named POSIX shared memory object:
 *
 * ```text
 * +------------------------+-----------------------------------------+
 * | control block          | data area (capacity bytes)              |
 * | prefix | strategy state| unit | unit | ...                | unit |
 * +------------------------+-----------------------------------------+
 * 0                        data_offset                     region_size
 * ```
 *
 * The control block holds the attach bookkeeping followed by either the
 * blocking ring's mutex and condition variables or the SPSC ring's padded
 * atomic indices.
 */

mod blocking;
mod channel;
mod control;
mod lifecycle;
mod region;
mod ring;
mod spsc;

pub use channel::ShmChannel;
pub use region::SharedRegion;
pub use ring::RingGeometry;
