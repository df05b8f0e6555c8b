/*!
 * Socket Rendezvous
 *
 * Two processes agree on nothing but a path. Whoever binds it first accepts
 * exactly one peer and then removes the path; whoever finds it taken
 * connects instead.
 */

use crate::core::errors::{ChannelError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::os::unix::net::{UnixListener, UnixStream};
use std::thread;
use std::time::Duration;

/// Which side of the rendezvous this process ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Bound the path and accepted the peer
    Acceptor,
    /// Found the path claimed and connected to it
    Connector,
}

/// Retry policy for the connector side
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

/// Meet the peer at `path`, returning the connected stream and our role
///
/// Each attempt tries to bind first, so a path released by an acceptor that
/// has already paired up can be claimed again. A path that is taken but
/// refuses connections (acceptor still starting, or a stale file) is retried
/// `policy.retries` times.
pub(crate) fn rendezvous(path: &str, policy: ConnectPolicy) -> Result<(UnixStream, Role)> {
    let mut last_error: Option<io::Error> = None;

    for attempt in 0..=policy.retries {
        if attempt > 0 {
            thread::sleep(policy.backoff);
        }

        match UnixListener::bind(path) {
            Ok(listener) => return accept_one(path, listener).map(|s| (s, Role::Acceptor)),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {}
            Err(e) => return Err(ChannelError::socket("bind", path, e)),
        }

        match UnixStream::connect(path) {
            Ok(stream) => {
                debug!("Connected to '{}' as connector (attempt {})", path, attempt + 1);
                return Ok((stream, Role::Connector));
            }
            Err(e) if is_transient(&e) => {
                debug!("Connect to '{}' attempt {} failed: {}", path, attempt + 1, e);
                last_error = Some(e);
            }
            Err(e) => return Err(ChannelError::socket("connect", path, e)),
        }
    }

    warn!(
        "Giving up on '{}' after {} connect attempts",
        path,
        policy.retries + 1
    );
    Err(ChannelError::socket(
        "connect",
        path,
        last_error.unwrap_or_else(|| io::Error::from(ErrorKind::ConnectionRefused)),
    ))
}

fn accept_one(path: &str, listener: UnixListener) -> Result<UnixStream> {
    debug!("Bound '{}', waiting for a peer", path);

    let accepted = loop {
        match listener.accept() {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => break other,
        }
    };

    // The path has served its purpose either way
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove socket path '{}': {}", path, e);
    }

    let (stream, _) = accepted.map_err(|e| ChannelError::socket("accept", path, e))?;
    debug!("Accepted peer on '{}' as acceptor", path);
    Ok(stream)
}

/// The path exists but nobody is accepting on it, or it vanished between
/// our bind and connect
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::NotFound | ErrorKind::Interrupted
    )
}
