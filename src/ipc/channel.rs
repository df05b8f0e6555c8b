/*!
 * Channel Interface
 *
 * The contract both transports implement: create, push, pop, destroy.
 * `Channel` is the closed set of transports and dispatches statically; the
 * `Transport` trait lets generic code (benchmarks, tests) run against either.
 */

use super::shm::{SharedRegion, ShmChannel};
use super::socket::SocketChannel;
use crate::core::config::ChannelConfig;
use crate::core::errors::{ChannelError, Result};
use crate::core::types::Flavor;
use crate::monitoring::ChannelStats;
use log::debug;
use std::io::ErrorKind;

/// Unit transfer over some transport
pub trait Transport {
    fn flavor(&self) -> Flavor;

    fn unit_size(&self) -> usize;

    fn endpoint(&self) -> &str;

    /// Copy exactly `unit_size` bytes into the channel, blocking until there is room
    fn push(&mut self, unit: &[u8]) -> Result<()>;

    /// Copy exactly `unit_size` bytes out of the channel, blocking until one is available
    fn pop(&mut self, unit: &mut [u8]) -> Result<()>;

    fn stats(&self) -> ChannelStats;
}

impl Transport for ShmChannel {
    fn flavor(&self) -> Flavor {
        Flavor::SharedMemory
    }

    fn unit_size(&self) -> usize {
        ShmChannel::unit_size(self)
    }

    fn endpoint(&self) -> &str {
        ShmChannel::endpoint(self)
    }

    fn push(&mut self, unit: &[u8]) -> Result<()> {
        ShmChannel::push(self, unit)
    }

    fn pop(&mut self, unit: &mut [u8]) -> Result<()> {
        ShmChannel::pop(self, unit)
    }

    fn stats(&self) -> ChannelStats {
        ShmChannel::stats(self)
    }
}

impl Transport for SocketChannel {
    fn flavor(&self) -> Flavor {
        Flavor::Socket
    }

    fn unit_size(&self) -> usize {
        SocketChannel::unit_size(self)
    }

    fn endpoint(&self) -> &str {
        SocketChannel::endpoint(self)
    }

    fn push(&mut self, unit: &[u8]) -> Result<()> {
        SocketChannel::push(self, unit)
    }

    fn pop(&mut self, unit: &mut [u8]) -> Result<()> {
        SocketChannel::pop(self, unit)
    }

    fn stats(&self) -> ChannelStats {
        SocketChannel::stats(self)
    }
}

/// A channel handle, owned by the process that created it
#[derive(Debug)]
pub enum Channel {
    SharedMemory(ShmChannel),
    Socket(SocketChannel),
}

impl Channel {
    /// Create a handle with default settings for `flavor`
    ///
    /// Shared memory attaches to (or creates) the ring named `endpoint`;
    /// sockets rendezvous with a peer at the path `endpoint`.
    pub fn create(endpoint: impl Into<String>, unit_size: usize, flavor: Flavor) -> Result<Self> {
        Self::open(&ChannelConfig::new(endpoint, unit_size, flavor)?)
    }

    /// Create a handle from an explicit configuration
    ///
    /// Every configuration check runs before any OS resource is touched.
    pub fn open(config: &ChannelConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Opening {} channel on '{}' ({} byte units)",
            config.flavor,
            config.endpoint,
            config.unit_size.get()
        );

        match config.flavor {
            Flavor::SharedMemory => ShmChannel::open(config).map(Channel::SharedMemory),
            Flavor::Socket => SocketChannel::open(config).map(Channel::Socket),
        }
    }

    fn transport(&self) -> &dyn Transport {
        match self {
            Channel::SharedMemory(c) => c,
            Channel::Socket(c) => c,
        }
    }

    /// Release this handle
    ///
    /// Process-local resources are always freed. Shared state is torn down
    /// only when this was the last handle on the endpoint.
    pub fn destroy(self) {
        match self {
            Channel::SharedMemory(c) => c.destroy(),
            Channel::Socket(c) => c.destroy(),
        }
    }

    /// Usable ring capacity in units; `None` for sockets
    pub fn capacity_units(&self) -> Option<usize> {
        match self {
            Channel::SharedMemory(c) => Some(c.capacity_units()),
            Channel::Socket(_) => None,
        }
    }

    /// Units queued in the ring; `None` for sockets
    pub fn len(&self) -> Option<usize> {
        match self {
            Channel::SharedMemory(c) => Some(c.len()),
            Channel::Socket(_) => None,
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|n| n == 0)
    }
}

impl Transport for Channel {
    fn flavor(&self) -> Flavor {
        self.transport().flavor()
    }

    fn unit_size(&self) -> usize {
        self.transport().unit_size()
    }

    fn endpoint(&self) -> &str {
        self.transport().endpoint()
    }

    #[inline]
    fn push(&mut self, unit: &[u8]) -> Result<()> {
        match self {
            Channel::SharedMemory(c) => c.push(unit),
            Channel::Socket(c) => c.push(unit),
        }
    }

    #[inline]
    fn pop(&mut self, unit: &mut [u8]) -> Result<()> {
        match self {
            Channel::SharedMemory(c) => c.pop(unit),
            Channel::Socket(c) => c.pop(unit),
        }
    }

    fn stats(&self) -> ChannelStats {
        self.transport().stats()
    }
}

/// Create a channel handle; see [`Channel::create`]
pub fn create(endpoint: impl Into<String>, unit_size: usize, flavor: Flavor) -> Result<Channel> {
    Channel::create(endpoint, unit_size, flavor)
}

/// Remove a leftover endpoint from an earlier run
///
/// Returns whether anything was removed. A missing endpoint is not an error.
pub fn remove_endpoint(endpoint: &str, flavor: Flavor) -> Result<bool> {
    match flavor {
        Flavor::SharedMemory => SharedRegion::unlink(endpoint),
        Flavor::Socket => match std::fs::remove_file(endpoint) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ChannelError::Io {
                path: endpoint.to_string(),
                source: e,
            }),
        },
    }
}
