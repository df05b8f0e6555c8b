/*!
 * Core Types
 * Common types used across the channel transports
 */

use super::errors::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport backing a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    /// Ring buffer in a named shared memory object
    SharedMemory,
    /// Connected unix stream socket
    Socket,
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mmap" | "shm" | "shared-memory" | "shared_memory" => Ok(Flavor::SharedMemory),
            "socket" | "unix" => Ok(Flavor::Socket),
            other => Err(format!("unknown channel flavor '{}'", other)),
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::SharedMemory => f.write_str("mmap"),
            Flavor::Socket => f.write_str("socket"),
        }
    }
}

/// Synchronization strategy of a shared memory ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingStrategy {
    /// Process-shared mutex and two condition variables, any number of producers and consumers
    #[default]
    Blocking,
    /// Lock-free indices with cooperative spinning, exactly one producer and one consumer
    Spsc,
}

impl RingStrategy {
    /// Tag stored in the control block so attachers can detect a mismatch
    #[inline]
    pub(crate) fn tag(self) -> u32 {
        match self {
            RingStrategy::Blocking => 0x424c_4b31, // "BLK1"
            RingStrategy::Spsc => 0x5350_5331,     // "SPS1"
        }
    }
}

impl FromStr for RingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocking" | "mutex" => Ok(RingStrategy::Blocking),
            "spsc" | "lockfree" | "lock-free" => Ok(RingStrategy::Spsc),
            other => Err(format!("unknown ring strategy '{}'", other)),
        }
    }
}

impl fmt::Display for RingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingStrategy::Blocking => f.write_str("blocking"),
            RingStrategy::Spsc => f.write_str("spsc"),
        }
    }
}

/// Size of one unit in bytes, always a non-zero power of two
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UnitSize(usize);

impl UnitSize {
    pub fn new(bytes: usize) -> Result<Self> {
        if bytes.is_power_of_two() {
            Ok(Self(bytes))
        } else {
            Err(ChannelError::InvalidUnitSize(bytes))
        }
    }

    #[inline(always)]
    pub fn get(self) -> usize {
        self.0
    }

    /// Reject buffers that are not exactly one unit long
    #[inline(always)]
    pub(crate) fn check(self, len: usize) -> Result<()> {
        if len == self.0 {
            Ok(())
        } else {
            Err(ChannelError::UnitLength {
                expected: self.0,
                actual: len,
            })
        }
    }
}

impl TryFrom<usize> for UnitSize {
    type Error = ChannelError;

    fn try_from(bytes: usize) -> Result<Self> {
        Self::new(bytes)
    }
}

impl<'de> Deserialize<'de> for UnitSize {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = usize::deserialize(deserializer)?;
        UnitSize::new(bytes).map_err(serde::de::Error::custom)
    }
}
