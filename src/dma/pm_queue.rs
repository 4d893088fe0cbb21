//! Power-management packet queue.
//!
//! While the host is suspended, frames headed for the firmware are parked
//! here instead of being sent. Resume drains them in arrival order.

use std::collections::VecDeque;

use crate::hw::{BufferToken, Frame, SessionId};
use crate::sync::CriticalSectionCell;

/// A frame parked during suspend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PmEntry {
    /// Accelerator-to-WLAN frame still owning its accelerator buffer
    Tx {
        /// Destination session
        session: SessionId,
        /// Accelerator buffer to return after sending
        token: BufferToken,
        /// Frame payload
        frame: Frame,
    },
    /// Intra-BSS forward of an exception frame
    Exception {
        /// Destination session
        session: SessionId,
        /// Frame payload
        frame: Frame,
    },
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PmStats {
    /// Frames parked
    pub enqueued: u64,
    /// Frames drained for sending
    pub dequeued: u64,
    /// Largest batch drained at once
    pub max_drained: u64,
    /// Frames dropped by an explicit flush
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct PmInner {
    suspended: bool,
    queue: VecDeque<PmEntry>,
    stats: PmStats,
}

/// Suspend/resume queue
#[derive(Debug, Default)]
pub struct SuspendResumeQueue {
    inner: CriticalSectionCell<PmInner>,
}

impl SuspendResumeQueue {
    /// Create an empty, running queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the host is suspended
    pub fn is_suspended(&self) -> bool {
        self.inner.with_ref(|pm| pm.suspended)
    }

    /// Set the suspended flag
    pub fn set_suspended(&self, suspended: bool) {
        self.inner.with(|pm| pm.suspended = suspended);
    }

    /// Park `entry` if suspended; hands it back otherwise
    pub fn park(&self, entry: PmEntry) -> Result<(), PmEntry> {
        self.inner.with(|pm| {
            if !pm.suspended {
                return Err(entry);
            }
            pm.queue.push_back(entry);
            pm.stats.enqueued += 1;
            Ok(())
        })
    }

    /// Take every parked frame in arrival order for sending
    pub fn drain(&self) -> Vec<PmEntry> {
        self.inner.with(|pm| {
            let batch: Vec<_> = pm.queue.drain(..).collect();
            let count = batch.len() as u64;
            pm.stats.dequeued += count;
            pm.stats.max_drained = pm.stats.max_drained.max(count);
            batch
        })
    }

    /// Remove every parked frame without sending
    pub fn clear(&self) -> Vec<PmEntry> {
        self.inner.with(|pm| {
            let dropped: Vec<_> = pm.queue.drain(..).collect();
            pm.stats.dropped += dropped.len() as u64;
            dropped
        })
    }

    /// Parked frame count
    pub fn len(&self) -> usize {
        self.inner.with_ref(|pm| pm.queue.len())
    }

    /// Whether nothing is parked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    pub fn stats(&self) -> PmStats {
        self.inner.with_ref(|pm| pm.stats)
    }
}
