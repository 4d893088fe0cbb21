//! Transmit descriptor pool.

use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::VecDeque;

use super::SlotId;
use crate::hw::BufferToken;
use crate::sync::CriticalSectionCell;

/// FIFO of unused slot ids
#[derive(Debug, Default)]
struct FreeList(VecDeque<SlotId>);

impl FreeList {
    fn filled(size: usize) -> Self {
        Self((0..size).map(|id| id as SlotId).collect())
    }

    fn pop(&mut self) -> Option<SlotId> {
        self.0.pop_front()
    }

    fn push(&mut self, id: SlotId) {
        self.0.push_back(id);
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolStats {
    /// Successful acquisitions
    pub acquired: u64,
    /// Acquisitions refused on exhaustion
    pub exhausted: u64,
    /// Slots returned by transmit completion
    pub completed: u64,
    /// Slots returned unsent
    pub aborted: u64,
    /// Completions naming a slot that was not in use
    pub stale: u64,
}

/// Slot occupancy read in one critical section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolCounts {
    /// Slots ready to acquire
    pub free: usize,
    /// Slots holding a frame handed to the firmware
    pub in_use: usize,
    /// Allocated slots
    pub size: usize,
}

#[derive(Debug, Default)]
struct PoolInner {
    slots: Vec<Option<BufferToken>>,
    free: FreeList,
    stats: PoolStats,
}

impl PoolInner {
    fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn take(&mut self, slot: SlotId) -> Option<BufferToken> {
        let token = self.slots.get_mut(usize::from(slot))?.take()?;
        self.free.push(slot);
        Some(token)
    }
}

/// Bounded pool of transmit descriptor slots
///
/// Invariant: `free_count() + in_use_count() == size()` at every point
/// observable outside the critical section.
#[derive(Debug, Default)]
pub struct TxDescriptorPool {
    inner: CriticalSectionCell<PoolInner>,
    in_flight: AtomicU32,
}

impl TxDescriptorPool {
    /// Create an unallocated pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` free slots, replacing any previous allocation.
    ///
    /// Returns the tokens that were still in flight under the old
    /// allocation.
    pub fn allocate(&self, size: usize) -> Vec<BufferToken> {
        let size = size.min(usize::from(SlotId::MAX) + 1);
        let orphans = self.inner.with(|pool| {
            let orphans = pool.slots.iter_mut().filter_map(Option::take).collect();
            pool.slots = vec![None; size];
            pool.free = FreeList::filled(size);
            orphans
        });
        self.in_flight.store(0, Ordering::Release);
        log::debug!(target: "wlan_offload", "tx descriptor pool allocated: {size} slots");
        orphans
    }

    /// Release every slot and drop the allocation.
    ///
    /// Returns the tokens of transfers that never completed; the caller
    /// hands them back to the accelerator.
    pub fn free_all(&self) -> Vec<BufferToken> {
        let orphans = self.inner.with(|pool| {
            let orphans = pool.slots.iter_mut().filter_map(Option::take).collect();
            pool.slots = Vec::new();
            pool.free = FreeList::default();
            orphans
        });
        self.in_flight.store(0, Ordering::Release);
        orphans
    }

    /// Take a free slot for `token`; `None` when the pool is exhausted
    pub fn acquire(&self, token: BufferToken) -> Option<SlotId> {
        let slot = self.inner.with(|pool| match pool.free.pop() {
            Some(slot) => {
                pool.slots[usize::from(slot)] = Some(token);
                pool.stats.acquired += 1;
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                Some(slot)
            }
            None => {
                pool.stats.exhausted += 1;
                None
            }
        });
        if slot.is_none() {
            log::trace!(target: "wlan_offload", "tx descriptor pool exhausted");
        }
        slot
    }

    /// Return a slot on transmit completion, yielding its token
    pub fn release(&self, slot: SlotId) -> Option<BufferToken> {
        self.give_back(slot, false)
    }

    /// Return a slot whose frame was never handed to the firmware
    pub fn abort(&self, slot: SlotId) -> Option<BufferToken> {
        self.give_back(slot, true)
    }

    fn give_back(&self, slot: SlotId, aborted: bool) -> Option<BufferToken> {
        let token = self.inner.with(|pool| {
            let token = pool.take(slot);
            match (token.is_some(), aborted) {
                (false, _) => pool.stats.stale += 1,
                (true, false) => pool.stats.completed += 1,
                (true, true) => pool.stats.aborted += 1,
            }
            if token.is_some() {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            token
        });
        if token.is_none() {
            log::warn!(target: "wlan_offload", "completion for idle descriptor slot {slot}");
        }
        token
    }

    /// Transfers currently owned by the accelerator
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Allocated slot count
    pub fn size(&self) -> usize {
        self.inner.with_ref(|pool| pool.slots.len())
    }

    /// Unused slot count
    pub fn free_count(&self) -> usize {
        self.inner.with_ref(|pool| pool.free.len())
    }

    /// In-use slot count
    pub fn in_use_count(&self) -> usize {
        self.inner.with_ref(PoolInner::in_use)
    }

    /// Free, in-use and total slots read in one critical section
    pub fn counts(&self) -> PoolCounts {
        self.inner.with_ref(|pool| PoolCounts {
            free: pool.free.len(),
            in_use: pool.in_use(),
            size: pool.slots.len(),
        })
    }

    /// Counter snapshot
    pub fn stats(&self) -> PoolStats {
        self.inner.with_ref(|pool| pool.stats)
    }
}
