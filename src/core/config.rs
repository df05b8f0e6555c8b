/*!
 * Channel Configuration
 *
 * Creation parameters with environment overrides and up-front validation
 */

use super::errors::{ChannelError, Result};
use super::limits::{
    DEFAULT_CONNECT_BACKOFF, DEFAULT_CONNECT_RETRIES, DEFAULT_REGION_SIZE, SHM_NAME_MAX,
    SOCKET_PATH_MAX,
};
use super::types::{Flavor, RingStrategy, UnitSize};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable selecting the shared memory ring strategy
pub const ENV_RING: &str = "CHANNEL_RING";
/// Environment variable overriding the shared memory region size in bytes
pub const ENV_REGION_SIZE: &str = "CHANNEL_REGION_SIZE";
/// Environment variable overriding the socket connect attempts
pub const ENV_CONNECT_RETRIES: &str = "CHANNEL_CONNECT_RETRIES";

/// Everything needed to create one channel handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// Shared memory object name or filesystem socket path
    pub endpoint: String,
    pub unit_size: UnitSize,
    pub flavor: Flavor,
    /// Ignored by the socket flavor
    #[serde(default)]
    pub ring: RingStrategy,
    /// Total size of the shared region, control block included
    #[serde(default = "default_region_size")]
    pub region_size: usize,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_backoff")]
    pub connect_backoff: Duration,
}

fn default_region_size() -> usize {
    DEFAULT_REGION_SIZE
}

fn default_connect_retries() -> u32 {
    DEFAULT_CONNECT_RETRIES
}

fn default_connect_backoff() -> Duration {
    DEFAULT_CONNECT_BACKOFF
}

impl ChannelConfig {
    /// Configuration with default ring strategy, region size and retry policy
    ///
    /// Fails if `unit_size` is not a power of two.
    pub fn new(endpoint: impl Into<String>, unit_size: usize, flavor: Flavor) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            unit_size: UnitSize::new(unit_size)?,
            flavor,
            ring: RingStrategy::default(),
            region_size: DEFAULT_REGION_SIZE,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_backoff: DEFAULT_CONNECT_BACKOFF,
        })
    }

    pub fn with_ring(mut self, ring: RingStrategy) -> Self {
        self.ring = ring;
        self
    }

    pub fn with_region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }

    pub fn with_connect_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.connect_retries = retries;
        self.connect_backoff = backoff;
        self
    }

    /// Apply `CHANNEL_RING`, `CHANNEL_REGION_SIZE` and `CHANNEL_CONNECT_RETRIES`
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env(mut self) -> Self {
        if let Ok(value) = std::env::var(ENV_RING) {
            match value.parse() {
                Ok(ring) => self.ring = ring,
                Err(e) => log::warn!("Ignoring {}: {}", ENV_RING, e),
            }
        }
        if let Ok(value) = std::env::var(ENV_REGION_SIZE) {
            match value.parse() {
                Ok(size) => self.region_size = size,
                Err(e) => log::warn!("Ignoring {}='{}': {}", ENV_REGION_SIZE, value, e),
            }
        }
        if let Ok(value) = std::env::var(ENV_CONNECT_RETRIES) {
            match value.parse() {
                Ok(retries) => self.connect_retries = retries,
                Err(e) => log::warn!("Ignoring {}='{}': {}", ENV_CONNECT_RETRIES, value, e),
            }
        }
        self
    }

    /// Check the endpoint against the limits of the selected flavor
    pub fn validate(&self) -> Result<()> {
        match self.flavor {
            Flavor::SharedMemory => validate_shm_name(&self.endpoint),
            Flavor::Socket => validate_socket_path(&self.endpoint),
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ChannelError {
    ChannelError::InvalidEndpoint {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn validate_shm_name(name: &str) -> Result<()> {
    let Some(rest) = name.strip_prefix('/') else {
        return Err(invalid(name, "shared memory names must start with '/'"));
    };
    if rest.is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if rest.contains('/') {
        return Err(invalid(name, "only the leading '/' is allowed"));
    }
    if name.contains('\0') {
        return Err(invalid(name, "name contains a NUL byte"));
    }
    if name.len() > SHM_NAME_MAX {
        return Err(invalid(
            name,
            format!("{} bytes exceeds the {} byte limit", name.len(), SHM_NAME_MAX),
        ));
    }
    Ok(())
}

fn validate_socket_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(path, "path is empty"));
    }
    if path.contains('\0') {
        return Err(invalid(path, "path contains a NUL byte"));
    }
    if path.len() >= SOCKET_PATH_MAX {
        return Err(invalid(
            path,
            format!(
                "{} bytes does not fit sockaddr_un ({} bytes with NUL)",
                path.len(),
                SOCKET_PATH_MAX
            ),
        ));
    }
    Ok(())
}
