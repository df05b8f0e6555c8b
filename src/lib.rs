/*!
 * IPC Channels Library
 *
 * Process-to-process channels that move fixed-size units with blocking
 * push/pop semantics, over either a ring buffer in named shared memory or a
 * unix stream socket.
 */

pub mod core;
pub mod ipc;
pub mod monitoring;

// Re-exports
pub use crate::core::{ChannelConfig, ChannelError, ErrorCategory, Flavor, Result, RingStrategy, UnitSize};
pub use ipc::{create, remove_endpoint, Channel, Role, ShmChannel, SocketChannel, Transport};
pub use monitoring::{init_tracing, ChannelStats};
