//! Statistics snapshot.
//!
//! Counters live next to the state they describe (resource machine,
//! descriptor pool, suspend queue, dispatcher, session directory). The
//! coordinator keeps only the data-path and message counters itself;
//! [`OffloadStats`] gathers everything into one copy.

use crate::dispatcher::DispatcherStats;
use crate::dma::{PmStats, PoolCounts, PoolStats};
use crate::hw::WlanEvent;
use crate::pipe::PipeLifecycleContext;
use crate::rm::{ResourceState, RmStats};
use crate::session::InterfaceContext;

use super::perf::PerfLevel;

/// Coordinator data-path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DatapathCounters {
    /// Frames handed to the firmware
    pub tx_sent: u64,
    /// Frames parked in the suspend queue
    pub tx_queued: u64,
    /// Frames dropped before reaching the firmware
    pub tx_dropped: u64,
    /// Transmit completions
    pub tx_completed: u64,
    /// Exception frames received
    pub rx_exception: u64,
    /// Exception frames delivered to the host stack
    pub rx_delivered: u64,
    /// Exception frames dropped
    pub rx_dropped: u64,
    /// Exception frames forwarded intra-BSS
    pub rx_forwarded: u64,
    /// Forwards refused by the firmware threshold or the host stack
    pub forward_errors: u64,
    /// DHCP indications raised
    pub dhcp_indications: u64,
    /// Frames sent by suspend-queue flushes
    pub pm_flushed: u64,
}

/// Accelerator control message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageCounters {
    /// Messages accepted by the accelerator
    pub sent: u64,
    /// Messages the accelerator refused
    pub failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) datapath: DatapathCounters,
    pub(crate) messages: MessageCounters,
}

/// Point-in-time copy of every counter and flag the coordinator keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadStats {
    /// Producer resource state
    pub resource_state: ResourceState,
    /// Resource-manager counters
    pub rm: RmStats,
    /// Pipe transition flags
    pub pipe_context: PipeLifecycleContext,
    /// Descriptor pool counters
    pub pool: PoolStats,
    /// Descriptor pool occupancy
    pub pool_counts: PoolCounts,
    /// Suspend queue counters
    pub pm: PmStats,
    /// Frames currently parked in the suspend queue
    pub pm_queued: usize,
    /// Host suspended
    pub suspended: bool,
    /// Opcode intake counters
    pub dispatcher: DispatcherStats,
    /// Data-path counters
    pub datapath: DatapathCounters,
    /// Control message counters
    pub messages: MessageCounters,
    /// Connection events processed, indexed by [`WlanEvent::index`]
    pub events: [u64; WlanEvent::COUNT],
    /// Connection events waiting on a transition
    pub pending_events: usize,
    /// Connection events evicted from the pending queue
    pub pending_evicted: u64,
    /// Associated SAP stations
    pub stations: usize,
    /// Offloaded interfaces
    pub interfaces: Vec<InterfaceContext>,
    /// Firmware image loaded
    pub uc_loaded: bool,
    /// WLAN data interface enabled towards the accelerator
    pub wdi_enabled: bool,
    /// STA associated
    pub sta_connected: bool,
    /// Current bandwidth votes
    pub perf: PerfLevel,
}

impl OffloadStats {
    /// Events of kind `event` processed so far
    pub fn event_count(&self, event: WlanEvent) -> u64 {
        self.events[event.index()]
    }
}
