/*!
 * Shared Memory Channel
 *
 * Handle over one attached ring. The ring strategy is picked at open time and
 * recorded in the control block, so every handle on an endpoint agrees on
 * the layout or fails to open.
 */

use super::control::{data_offset, BlockingControl, ControlBlock, SpscControl};
use super::lifecycle::{attach, detach, ExpectedLayout};
use super::region::SharedRegion;
use super::ring::{RingData, RingGeometry};
use crate::core::config::ChannelConfig;
use crate::core::errors::Result;
use crate::core::types::{RingStrategy, UnitSize};
use crate::monitoring::{ChannelCounters, ChannelStats};
use log::{debug, warn};
use std::marker::PhantomData;
use std::sync::atomic::Ordering;

/// One process's view of a ring with control block layout `C`
struct ShmRing<C: ControlBlock> {
    region: SharedRegion,
    geometry: RingGeometry,
    data: RingData,
    _control: PhantomData<C>,
}

// SAFETY: the control block synchronizes every access to the mapped memory
unsafe impl<C: ControlBlock> Send for ShmRing<C> {}

impl<C: ControlBlock> ShmRing<C> {
    fn open(name: &str, unit: UnitSize, region_size: usize) -> Result<Self> {
        let header = data_offset::<C>();
        let geometry = RingGeometry::new(region_size, header, unit.get())?;
        let region = SharedRegion::open_or_create(name, region_size)?;

        // SAFETY: region_size >= header + capacity was checked by RingGeometry
        let data = unsafe {
            RingData::new(
                std::ptr::NonNull::new_unchecked(region.base().as_ptr().add(header)),
                geometry.capacity(),
            )
        };

        let ring = Self {
            region,
            geometry,
            data,
            _control: PhantomData,
        };

        let attached = attach(
            ring.control(),
            name,
            ExpectedLayout {
                unit_size: unit.get(),
                region_size,
            },
        );

        // Nothing was registered, so dropping the ring only unmaps it. An
        // object this call created and nobody else holds goes with it.
        if let Err(e) = attached {
            let holders = ring.control().prefix().ref_count.load(Ordering::Acquire);
            if ring.region.created() && holders == 0 {
                match SharedRegion::unlink(name) {
                    Ok(_) => debug!("Removed shared memory object '{}' after failed attach", name),
                    Err(unlink) => warn!("Failed to remove shared memory object '{}': {}", name, unlink),
                }
            }
            return Err(e);
        }

        Ok(ring)
    }

    #[inline(always)]
    fn control(&self) -> &C {
        // SAFETY: the region starts with a C, lives as long as self, and a
        // zero-filled or constructed C is always valid
        unsafe { &*self.region.base().as_ptr().cast::<C>() }
    }

    #[inline(always)]
    fn push(&self, unit: &[u8]) -> bool {
        self.control().push(&self.geometry, &self.data, unit)
    }

    #[inline(always)]
    fn pop(&self, unit: &mut [u8]) -> bool {
        self.control().pop(&self.geometry, &self.data, unit)
    }

    fn occupancy(&self) -> usize {
        self.control().occupancy(&self.geometry)
    }

    /// Deregister, then drop the mapping
    fn release(self) {
        let name = self.region.name().to_string();
        detach(self.control(), &name);

        // The name goes on every detach; live mappings are unaffected
        match SharedRegion::unlink(&name) {
            Ok(true) => debug!("Removed shared memory object '{}'", name),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove shared memory object '{}': {}", name, e),
        }
    }
}

enum Ring {
    Blocking(ShmRing<BlockingControl>),
    Spsc(ShmRing<SpscControl>),
}

macro_rules! with_ring {
    ($ring:expr, $r:ident => $body:expr) => {
        match $ring {
            Ring::Blocking($r) => $body,
            Ring::Spsc($r) => $body,
        }
    };
}

/// A handle on a shared memory ring
///
/// Any number of handles, in any processes, may attach to one endpoint.
/// The blocking strategy supports any mix of producers and consumers; the
/// SPSC strategy requires exactly one pushing handle and one popping handle.
pub struct ShmChannel {
    // None only after release
    ring: Option<Ring>,
    endpoint: String,
    unit_size: UnitSize,
    strategy: RingStrategy,
    counters: ChannelCounters,
}

impl ShmChannel {
    /// Open or create the ring named by `config.endpoint`
    ///
    /// Expects an already validated configuration.
    pub fn open(config: &ChannelConfig) -> Result<Self> {
        let name = config.endpoint.as_str();
        let ring = match config.ring {
            RingStrategy::Blocking => {
                Ring::Blocking(ShmRing::open(name, config.unit_size, config.region_size)?)
            }
            RingStrategy::Spsc => {
                Ring::Spsc(ShmRing::open(name, config.unit_size, config.region_size)?)
            }
        };

        Ok(Self {
            ring: Some(ring),
            endpoint: config.endpoint.clone(),
            unit_size: config.unit_size,
            strategy: config.ring,
            counters: ChannelCounters::new(),
        })
    }

    fn ring(&self) -> &Ring {
        match &self.ring {
            Some(ring) => ring,
            None => unreachable!("shared memory channel used after release"),
        }
    }

    /// Copy one unit in, blocking while the ring is full
    pub fn push(&mut self, unit: &[u8]) -> Result<()> {
        self.unit_size.check(unit.len())?;
        let waited = with_ring!(self.ring(), r => r.push(unit));
        self.counters.record_push(unit.len(), waited);
        Ok(())
    }

    /// Copy one unit out, blocking while the ring is empty
    pub fn pop(&mut self, unit: &mut [u8]) -> Result<()> {
        self.unit_size.check(unit.len())?;
        let waited = with_ring!(self.ring(), r => r.pop(unit));
        self.counters.record_pop(unit.len(), waited);
        Ok(())
    }

    /// Units the ring holds before `push` blocks
    pub fn capacity_units(&self) -> usize {
        with_ring!(self.ring(), r => r.geometry.usable_units())
    }

    /// Units currently queued, across all handles
    ///
    /// Only a snapshot: other processes may change it immediately.
    pub fn len(&self) -> usize {
        with_ring!(self.ring(), r => r.occupancy())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn unit_size(&self) -> usize {
        self.unit_size.get()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ring_strategy(&self) -> RingStrategy {
        self.strategy
    }

    pub fn stats(&self) -> ChannelStats {
        self.counters.snapshot()
    }

    /// Detach from the ring and unmap it
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for ShmChannel {
    fn drop(&mut self) {
        if let Some(ring) = self.ring.take() {
            with_ring!(ring, r => r.release());
        }
    }
}

impl std::fmt::Debug for ShmChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmChannel")
            .field("endpoint", &self.endpoint)
            .field("unit_size", &self.unit_size.get())
            .field("strategy", &self.strategy)
            .finish()
    }
}
