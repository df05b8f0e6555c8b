/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classification of a [`ChannelError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected before any OS resource was touched
    Configuration,
    /// An OS resource could not be allocated, opened or initialized
    Resource,
    /// Failure on an established channel
    Runtime,
}

/// Channel errors with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum ChannelError {
    #[error("Unit size {0} is not a power of two")]
    #[diagnostic(
        code(channel::invalid_unit_size),
        help("Units must be 1, 2, 4, 8, ... bytes so that ring offsets stay aligned.")
    )]
    InvalidUnitSize(usize),

    #[error("Invalid endpoint '{name}': {reason}")]
    #[diagnostic(
        code(channel::invalid_endpoint),
        help("Shared memory names look like '/name'; socket paths must fit in sockaddr_un.")
    )]
    InvalidEndpoint { name: String, reason: String },

    #[error("Region of {region_size} bytes cannot hold two {unit_size}-byte units after a {header_size}-byte control block")]
    #[diagnostic(
        code(channel::region_too_small),
        help("Increase the region size or use a smaller unit size.")
    )]
    RegionTooSmall {
        region_size: usize,
        unit_size: usize,
        header_size: usize,
    },

    #[error("Endpoint '{name}' is in use with an incompatible layout: {detail}")]
    #[diagnostic(
        code(channel::layout_mismatch),
        help("Every process attached to one endpoint must use the same ring strategy, unit size and region size.")
    )]
    LayoutMismatch { name: String, detail: String },

    #[error("Unit buffer holds {actual} bytes, channel transfers {expected}-byte units")]
    #[diagnostic(
        code(channel::unit_length),
        help("Pass a buffer of exactly unit_size bytes to push and pop.")
    )]
    UnitLength { expected: usize, actual: usize },

    #[error("Shared memory {op} failed for '{name}': {source}")]
    #[diagnostic(
        code(channel::shared_memory),
        help("Check /dev/shm permissions and available space.")
    )]
    SharedMemory {
        op: &'static str,
        name: String,
        #[source]
        source: Errno,
    },

    #[error("Process-shared {op} initialization failed: {source}")]
    #[diagnostic(code(channel::sync_init))]
    SyncInit {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("Socket {op} failed on '{path}': {source}")]
    #[diagnostic(
        code(channel::socket),
        help("A stale socket file may be left over from a previous run; remove it and retry.")
    )]
    Socket {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Peer disconnected from '{0}'")]
    #[diagnostic(
        code(channel::peer_disconnected),
        help("The other side destroyed its channel or exited.")
    )]
    PeerDisconnected(String),

    #[error("I/O error on '{path}': {source}")]
    #[diagnostic(code(channel::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ChannelError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChannelError::InvalidUnitSize(_)
            | ChannelError::InvalidEndpoint { .. }
            | ChannelError::RegionTooSmall { .. }
            | ChannelError::LayoutMismatch { .. }
            | ChannelError::UnitLength { .. } => ErrorCategory::Configuration,
            ChannelError::SharedMemory { .. }
            | ChannelError::SyncInit { .. }
            | ChannelError::Socket { .. } => ErrorCategory::Resource,
            ChannelError::PeerDisconnected(_) | ChannelError::Io { .. } => ErrorCategory::Runtime,
        }
    }

    /// The other end of a socket channel went away
    #[inline]
    pub fn is_peer_disconnected(&self) -> bool {
        matches!(self, ChannelError::PeerDisconnected(_))
    }

    pub(crate) fn shm(op: &'static str, name: &str, source: Errno) -> Self {
        ChannelError::SharedMemory {
            op,
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn socket(op: &'static str, path: &str, source: std::io::Error) -> Self {
        ChannelError::Socket {
            op,
            path: path.to_string(),
            source,
        }
    }
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
