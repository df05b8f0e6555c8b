/*!
 * Socket Channel
 * Unit transfer over one connected unix stream socket
 */

use super::rendezvous::{rendezvous, ConnectPolicy, Role};
use crate::core::config::ChannelConfig;
use crate::core::errors::{ChannelError, Result};
use crate::core::types::UnitSize;
use crate::monitoring::{ChannelCounters, ChannelStats};
use nix::errno::Errno;
use nix::sys::socket::{recv, send, MsgFlags};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

/// A full-duplex channel to exactly one peer
///
/// Both sides may push and pop. Units arrive whole and in order, however the
/// kernel splits the byte stream.
#[derive(Debug)]
pub struct SocketChannel {
    stream: UnixStream,
    endpoint: String,
    unit_size: UnitSize,
    role: Role,
    counters: ChannelCounters,
}

impl SocketChannel {
    /// Rendezvous with the peer at `config.endpoint`
    ///
    /// Blocks until a peer shows up when this side becomes the acceptor.
    pub fn open(config: &ChannelConfig) -> Result<Self> {
        let policy = ConnectPolicy {
            retries: config.connect_retries,
            backoff: config.connect_backoff,
        };
        let (stream, role) = rendezvous(&config.endpoint, policy)?;

        Ok(Self {
            stream,
            endpoint: config.endpoint.clone(),
            unit_size: config.unit_size,
            role,
            counters: ChannelCounters::new(),
        })
    }

    /// Send one unit, blocking until the kernel has taken all of it
    pub fn push(&mut self, unit: &[u8]) -> Result<()> {
        self.unit_size.check(unit.len())?;

        let fd = self.stream.as_raw_fd();
        let mut sent = 0;
        while sent < unit.len() {
            match send(fd, &unit[sent..], SEND_FLAGS) {
                Ok(0) => return Err(self.disconnected()),
                Ok(n) => sent += n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(self.io_error(e)),
            }
        }

        self.counters.record_push(unit.len(), false);
        Ok(())
    }

    /// Receive one unit, blocking until all of it has arrived
    pub fn pop(&mut self, unit: &mut [u8]) -> Result<()> {
        self.unit_size.check(unit.len())?;

        let fd = self.stream.as_raw_fd();
        let mut received = 0;
        while received < unit.len() {
            match recv(fd, &mut unit[received..], MsgFlags::empty()) {
                // Orderly shutdown, possibly in the middle of a unit
                Ok(0) => return Err(self.disconnected()),
                Ok(n) => received += n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(self.io_error(e)),
            }
        }

        self.counters.record_pop(unit.len(), false);
        Ok(())
    }

    #[inline]
    pub fn unit_size(&self) -> usize {
        self.unit_size.get()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stats(&self) -> ChannelStats {
        self.counters.snapshot()
    }

    /// Close the connection; the peer sees `PeerDisconnected` on its next pop
    pub fn destroy(self) {
        drop(self);
    }

    fn disconnected(&self) -> ChannelError {
        ChannelError::PeerDisconnected(self.endpoint.clone())
    }

    fn io_error(&self, errno: Errno) -> ChannelError {
        match errno {
            Errno::EPIPE | Errno::ECONNRESET => self.disconnected(),
            other => ChannelError::Io {
                path: self.endpoint.clone(),
                source: std::io::Error::from(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(unit: usize) -> (SocketChannel, SocketChannel) {
        let (a, b) = UnixStream::pair().unwrap();
        let make = |stream, role| SocketChannel {
            stream,
            endpoint: "pair".to_string(),
            unit_size: UnitSize::new(unit).unwrap(),
            role,
            counters: ChannelCounters::new(),
        };
        (make(a, Role::Acceptor), make(b, Role::Connector))
    }

    #[test]
    fn test_units_cross_in_both_directions() {
        let (mut left, mut right) = pair(4);
        let mut unit = [0u8; 4];

        left.push(&[1, 2, 3, 4]).unwrap();
        right.pop(&mut unit).unwrap();
        assert_eq!(unit, [1, 2, 3, 4]);

        right.push(&[5, 6, 7, 8]).unwrap();
        left.pop(&mut unit).unwrap();
        assert_eq!(unit, [5, 6, 7, 8]);
    }

    #[test]
    fn test_large_unit_reassembled() {
        let (mut left, mut right) = pair(1 << 20);
        let payload: Vec<u8> = (0..1usize << 20).map(|i| (i % 251) as u8).collect();

        let sender = std::thread::spawn(move || {
            left.push(&payload).unwrap();
            payload
        });
        let mut unit = vec![0u8; 1 << 20];
        right.pop(&mut unit).unwrap();
        assert_eq!(unit, sender.join().unwrap());
    }

    #[test]
    fn test_closed_peer_reported() {
        let (mut left, right) = pair(8);
        right.destroy();

        let mut unit = [0u8; 8];
        assert!(left.pop(&mut unit).unwrap_err().is_peer_disconnected());
        assert!(left.push(&unit).unwrap_err().is_peer_disconnected());
    }
}
