/*!
 * IPC Module
 * Fixed-size unit channels between processes: shared memory rings and unix sockets
 */

pub mod channel;
pub mod shm;
pub mod socket;

// Re-export for convenience
pub use channel::{create, remove_endpoint, Channel, Transport};
pub use shm::ShmChannel;
pub use socket::{Role, SocketChannel};
