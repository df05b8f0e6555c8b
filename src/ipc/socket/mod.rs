/*!
 * Socket Transport
 * Unix stream socket channel with path-based rendezvous
 */

mod channel;
mod rendezvous;

pub use channel::SocketChannel;
pub use rendezvous::Role;
