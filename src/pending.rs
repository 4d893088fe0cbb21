//! Bounded queue of connection events deferred during pipe transitions.
//!
//! An event that arrives while the pipes are loading or unloading, and
//! whose wait on the transition times out, is parked here tagged with the
//! phase it arrived in. When that phase completes, its events are replayed
//! in arrival order. Entries of the other phase stay queued.
//!
//! The queue lives inside the control state and is only touched under the
//! control lock.

use std::collections::VecDeque;

use crate::hw::{DeviceMode, MacAddr, SessionId, WlanEvent};

/// Transition an event was deferred behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Pipes were being enabled
    Loading,
    /// Pipes were being disabled
    Unloading,
}

/// A deferred connection event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingEvent {
    /// Session the event belongs to
    pub session: SessionId,
    /// Device mode of that session
    pub mode: DeviceMode,
    /// Event kind
    pub event: WlanEvent,
    /// Firmware station id
    pub station_id: u8,
    /// Peer or own MAC address
    pub mac: MacAddr,
    /// Phase the event is waiting on
    pub phase: Phase,
}

/// FIFO of deferred events with oldest-first eviction
#[derive(Debug)]
pub struct PendingEventQueue {
    capacity: usize,
    events: VecDeque<PendingEvent>,
    evicted: u64,
}

impl PendingEventQueue {
    /// Create an empty queue holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            evicted: 0,
        }
    }

    /// Append `event`, evicting the oldest entry if full.
    ///
    /// Returns the evicted entry, if any.
    pub fn enqueue(&mut self, event: PendingEvent) -> Option<PendingEvent> {
        if self.capacity == 0 {
            self.evicted += 1;
            return Some(event);
        }
        let evicted = if self.events.len() >= self.capacity {
            self.evicted += 1;
            let oldest = self.events.pop_front();
            log::debug!(target: "wlan_offload", "pending event queue full, evicting oldest");
            oldest
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    /// Remove and return every event of `phase` in arrival order
    pub fn take_phase(&mut self, phase: Phase) -> Vec<PendingEvent> {
        let mut taken = Vec::new();
        self.events.retain(|event| {
            if event.phase == phase {
                taken.push(*event);
                false
            } else {
                true
            }
        });
        taken
    }

    /// Remove and return every event in arrival order
    pub fn drain_all(&mut self) -> Vec<PendingEvent> {
        self.events.drain(..).collect()
    }

    /// Queued event count
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum queued events
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped by eviction since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate queued events oldest first
    pub fn iter(&self) -> impl Iterator<Item = &PendingEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PENDING_EVENT_CAPACITY;

    fn event(n: u8, phase: Phase) -> PendingEvent {
        PendingEvent {
            session: 0,
            mode: DeviceMode::Sap,
            event: WlanEvent::ClientConnectEx,
            station_id: n,
            mac: [0x02, 0, 0, 0, 0, n],
            phase,
        }
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut queue = PendingEventQueue::new(PENDING_EVENT_CAPACITY);
        for n in 1..=25 {
            queue.enqueue(event(n, Phase::Loading));
            assert!(queue.len() <= PENDING_EVENT_CAPACITY);
        }
        assert_eq!(queue.len(), 20);
        assert_eq!(queue.evicted(), 5);
        let ids: Vec<u8> = queue.iter().map(|e| e.station_id).collect();
        assert_eq!(ids, (6..=25).collect::<Vec<_>>());
    }

    #[test]
    fn twenty_first_enqueue_evicts_exactly_one() {
        let mut queue = PendingEventQueue::new(PENDING_EVENT_CAPACITY);
        for n in 0..20 {
            assert_eq!(queue.enqueue(event(n, Phase::Loading)), None);
        }
        let evicted = queue.enqueue(event(20, Phase::Loading));
        assert_eq!(evicted.map(|e| e.station_id), Some(0));
        assert_eq!(queue.len(), 20);
    }

    #[test]
    fn take_phase_leaves_other_phase_queued() {
        let mut queue = PendingEventQueue::new(8);
        queue.enqueue(event(1, Phase::Loading));
        queue.enqueue(event(2, Phase::Unloading));
        queue.enqueue(event(3, Phase::Loading));

        let loading = queue.take_phase(Phase::Loading);
        assert_eq!(loading.iter().map(|e| e.station_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().map(|e| e.phase), Some(Phase::Unloading));
    }

    #[test]
    fn drain_all_returns_everything_in_order() {
        let mut queue = PendingEventQueue::new(4);
        queue.enqueue(event(1, Phase::Unloading));
        queue.enqueue(event(2, Phase::Loading));
        let all = queue.drain_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].station_id, 1);
        assert!(queue.is_empty());
    }
}
