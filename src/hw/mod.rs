//! Collaborator interfaces at the hardware boundary.
//!
//! The coordinator never touches hardware directly. It drives three
//! collaborators supplied at construction:
//!
//! - [`Accelerator`] - the offload engine's driver API (resource manager,
//!   pipes, interface registration, control messages)
//! - [`Firmware`] - the WLAN target and its data path (ring resources, pipe
//!   activation, offload enable, frame submission)
//! - [`HostStack`] - the host network stack (delivery, forwarding, wake lock)
//!
//! Addressing of ring memory differs between platforms and is selected once
//! at initialization through [`AddressingStrategy`].

pub mod addressing;

pub use addressing::{AddressingStrategy, PhysicalAddressing, SmmuAddressing, strategy_for};

use crate::dma::SlotId;
use crate::driver::error::HwResult;

/// MAC address
pub type MacAddr = [u8; 6];

/// Firmware session (virtual device) identifier
pub type SessionId = u8;

/// Owned packet buffer
pub type Frame = Vec<u8>;

/// All-zero MAC address
pub const ZERO_MAC: MacAddr = [0; 6];

// =============================================================================
// Identifiers
// =============================================================================

/// Resource-manager resources owned by the WLAN side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResourceName {
    /// WLAN producer resource (host to accelerator traffic)
    WlanProd,
    /// WLAN consumer resource (accelerator to host traffic)
    WlanCons,
}

/// Result of a resource request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GrantStatus {
    /// Granted synchronously
    Granted,
    /// Grant will arrive later through the notify callback
    Pending,
}

/// Accelerator client endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientId {
    /// Shared WLAN producer
    Wlan1Prod,
    /// Shared WLAN consumer (uC TX pipe)
    Wlan1Cons,
    /// Consumer for interface 0
    Wlan2Cons,
    /// Consumer for interface 1
    Wlan3Cons,
    /// Consumer for interface 2
    Wlan4Cons,
}

/// Direction of a hardware transfer pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipeDirection {
    /// Accelerator to WLAN
    Tx,
    /// WLAN to accelerator
    Rx,
}

/// Accelerator pipe handle; zero is never valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipeHandle(pub u32);

impl PipeHandle {
    /// Whether the accelerator returned the null handle
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Accelerator-owned transmit descriptor, returned on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferToken(pub u64);

/// Virtual device mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceMode {
    /// Infrastructure station
    Sta,
    /// Soft access point
    Sap,
    /// P2P client
    P2pClient,
    /// P2P group owner
    P2pGo,
    /// Any other mode
    Other,
}

impl DeviceMode {
    /// Whether the mode participates in offload
    pub const fn is_offloaded(self) -> bool {
        matches!(self, DeviceMode::Sta | DeviceMode::Sap)
    }
}

/// Connection-lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WlanEvent {
    /// STA associated to an AP
    StaConnect,
    /// STA disassociated
    StaDisconnect,
    /// SAP started
    ApConnect,
    /// SAP stopped
    ApDisconnect,
    /// Client associated to the SAP (with station id)
    ClientConnectEx,
    /// Client left the SAP
    ClientDisconnect,
}

impl WlanEvent {
    /// Number of event kinds
    pub const COUNT: usize = 6;

    /// Dense index for per-event counters
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name for logs
    pub const fn as_str(self) -> &'static str {
        match self {
            WlanEvent::StaConnect => "STA_CONNECT",
            WlanEvent::StaDisconnect => "STA_DISCONNECT",
            WlanEvent::ApConnect => "AP_CONNECT",
            WlanEvent::ApDisconnect => "AP_DISCONNECT",
            WlanEvent::ClientConnectEx => "CLIENT_CONNECT_EX",
            WlanEvent::ClientDisconnect => "CLIENT_DISCONNECT",
        }
    }

    /// Whether the event tears an interface down
    pub const fn is_interface_disconnect(self) -> bool {
        matches!(self, WlanEvent::StaDisconnect | WlanEvent::ApDisconnect)
    }
}

/// Event carried by a data-path callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataEvent {
    /// A frame was received and ownership passes to the coordinator
    Receive,
    /// A previously submitted write finished
    WriteDone,
}

// =============================================================================
// Ring and Pipe Parameters
// =============================================================================

/// A contiguous ring or index region owned by the WLAN data path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingRegion {
    /// Base address (physical, or IOVA once mapped)
    pub base: u64,
    /// Size in bytes
    pub size: u32,
}

/// Ring resources the WLAN data path exposes to the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingResources {
    /// TX completion ring
    pub tx_comp_ring: RingRegion,
    /// TX packet buffer pool
    pub tx_buffers: RingRegion,
    /// Number of TX buffers in the pool
    pub tx_buffer_count: u32,
    /// RX ready ring
    pub rx_ready_ring: RingRegion,
    /// RX processed-done index
    pub rx_proc_done_idx: RingRegion,
}

impl RingResources {
    /// Whether every ring the pipes need is present
    pub const fn is_ready(&self) -> bool {
        self.tx_comp_ring.base != 0 && self.rx_ready_ring.base != 0 && self.rx_proc_done_idx.base != 0
    }
}

/// Ring address as presented to the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingAddress {
    /// Physical address
    Physical(u64),
    /// SMMU I/O virtual address
    Iova(u64),
}

/// Parameters for connecting one pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipeConnectParams {
    /// Accelerator client endpoint
    pub client: ClientId,
    /// Pipe direction
    pub direction: PipeDirection,
    /// Main ring
    pub ring: RingAddress,
    /// Main ring size in bytes
    pub ring_size: u32,
    /// Companion region (TX buffers or RX done index)
    pub companion: RingAddress,
    /// Companion size in bytes
    pub companion_size: u32,
}

/// Connected pipe as reported by the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipeConnection {
    /// Pipe handle
    pub handle: PipeHandle,
    /// Doorbell address the firmware rings
    pub doorbell: u64,
}

/// Clients bound to an offloaded interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceClients {
    /// Consumer endpoint
    pub cons: ClientId,
    /// Producer endpoint
    pub prod: ClientId,
}

/// Control message sent to the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcceleratorMessage {
    /// WLAN data interface enabled
    WdiEnable,
    /// WLAN data interface disabled
    WdiDisable,
    /// Interface or client connection change
    Connection {
        /// Event kind
        event: WlanEvent,
        /// Interface index
        iface_id: u8,
        /// Peer or own MAC address
        mac: MacAddr,
    },
    /// Client association carrying the station id attribute
    ClientConnectEx {
        /// Interface index
        iface_id: u8,
        /// Client MAC
        mac: MacAddr,
        /// Firmware station id
        station_id: u8,
    },
    /// Channel concurrency switched to single-channel
    SwitchToScc,
    /// Channel concurrency switched to multi-channel
    SwitchToMcc,
    /// Firmware about to be rejuvenated
    FwSsrBeforeShutdown,
    /// Data quota reached on the STA interface
    QuotaReached {
        /// Quota in bytes
        quota_bytes: u64,
    },
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Offload engine driver API
///
/// Calls may come from any thread. Implementations must not call back into
/// the coordinator synchronously; asynchronous notifications go through
/// [`IsrHandle`](crate::driver::IsrHandle).
pub trait Accelerator: Send + Sync {
    /// Request a resource; may grant synchronously or later
    fn request_resource(&self, resource: ResourceName) -> HwResult<GrantStatus>;

    /// Release a resource
    fn release_resource(&self, resource: ResourceName) -> HwResult<()>;

    /// Probe whether the resource is actually held, if the driver can tell
    fn resource_held(&self, _resource: ResourceName) -> Option<bool> {
        None
    }

    /// Tell the accelerator a deferred consumer request is now granted
    fn notify_consumer_granted(&self, resource: ResourceName);

    /// Set the bandwidth vote for a resource
    fn set_perf_profile(&self, resource: ResourceName, bandwidth_mbps: u32) -> HwResult<()>;

    /// Connect a pipe
    fn connect_pipe(&self, params: &PipeConnectParams) -> HwResult<PipeConnection>;

    /// Disconnect a pipe
    fn disconnect_pipe(&self, handle: PipeHandle) -> HwResult<()>;

    /// Enable a connected pipe
    fn enable_pipe(&self, handle: PipeHandle) -> HwResult<()>;

    /// Resume an enabled pipe
    fn resume_pipe(&self, handle: PipeHandle) -> HwResult<()>;

    /// Suspend a running pipe
    fn suspend_pipe(&self, handle: PipeHandle) -> HwResult<()>;

    /// Disable a suspended pipe
    fn disable_pipe(&self, handle: PipeHandle) -> HwResult<()>;

    /// Register an offloaded interface
    fn register_interface(&self, iface_id: u8, clients: InterfaceClients) -> HwResult<()>;

    /// Deregister an offloaded interface
    fn deregister_interface(&self, iface_id: u8) -> HwResult<()>;

    /// Send a control message
    fn send_message(&self, message: &AcceleratorMessage) -> HwResult<()>;

    /// Return a transmit descriptor to the accelerator
    fn release_buffer(&self, token: BufferToken);
}

/// WLAN target and data path
pub trait Firmware: Send + Sync {
    /// Ring resources shared with the accelerator
    fn ring_resources(&self) -> HwResult<RingResources>;

    /// Number of transmit descriptors the data path can take
    fn tx_pool_capacity(&self) -> usize;

    /// Mark a firmware pipe active or inactive
    fn set_pipe_active(&self, direction: PipeDirection, active: bool);

    /// Map or unmap rx hash tables for the accelerator (SMMU platforms)
    fn map_rx_hash(&self, map: bool) -> HwResult<()>;

    /// Ask the firmware for a statistics snapshot
    fn request_stats(&self) -> HwResult<()>;

    /// Enable or disable data-path offload for a session
    fn set_offload(&self, session: SessionId, mode: DeviceMode, enable: bool) -> HwResult<()>;

    /// Submit a frame for transmission; returns the frame on refusal
    fn send_tx(&self, session: SessionId, slot: SlotId, frame: Frame) -> Result<(), Frame>;

    /// Whether the session's forward queue has room
    fn forward_threshold_ok(&self, session: SessionId) -> bool;

    /// Peer authorization state, if the peer is known
    fn peer_authorized(&self, session: SessionId, peer: MacAddr) -> Option<bool>;

    /// Ask for sharing statistics
    fn request_sharing_stats(&self, reset: bool) -> HwResult<()>;

    /// Program a data quota
    fn set_quota(&self, enable: bool, quota_lo: u32, quota_hi: u32) -> HwResult<()>;
}

/// Host network stack
pub trait HostStack: Send + Sync {
    /// Deliver an exception frame to the stack; `false` if refused
    fn deliver(&self, session: SessionId, frame: Frame) -> bool;

    /// Transmit a frame out of the session's interface
    fn transmit(&self, session: SessionId, frame: Frame) -> Result<(), Frame>;

    /// Whether intra-BSS forwarding is allowed on the session
    fn intra_bss_forwarding(&self, session: SessionId) -> bool;

    /// Whether transmit is blocked (DFS channel availability check)
    fn tx_blocked(&self, session: SessionId) -> bool;

    /// DHCP seen from a SAP client
    fn dhcp_indication(&self, session: SessionId, station: MacAddr);

    /// Hold or drop the offload wake lock
    fn wake_lock(&self, hold: bool);

    /// Whether the interface behind the session still exists
    fn interface_live(&self, session: SessionId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_detected() {
        assert!(PipeHandle(0).is_null());
        assert!(!PipeHandle(7).is_null());
    }

    #[test]
    fn only_sta_and_sap_are_offloaded() {
        assert!(DeviceMode::Sta.is_offloaded());
        assert!(DeviceMode::Sap.is_offloaded());
        assert!(!DeviceMode::P2pGo.is_offloaded());
        assert!(!DeviceMode::Other.is_offloaded());
    }

    #[test]
    fn ring_resources_ready_requires_rings() {
        let mut res = RingResources::default();
        assert!(!res.is_ready());
        res.tx_comp_ring.base = 0x1000;
        res.rx_ready_ring.base = 0x2000;
        res.rx_proc_done_idx.base = 0x3000;
        assert!(res.is_ready());
    }

    #[test]
    fn disconnect_events_classified() {
        assert!(WlanEvent::StaDisconnect.is_interface_disconnect());
        assert!(WlanEvent::ApDisconnect.is_interface_disconnect());
        assert!(!WlanEvent::ClientDisconnect.is_interface_disconnect());
        assert_eq!(WlanEvent::ClientConnectEx.as_str(), "CLIENT_CONNECT_EX");
    }

    #[test]
    fn event_indices_are_dense() {
        assert_eq!(WlanEvent::StaConnect.index(), 0);
        assert_eq!(WlanEvent::ClientDisconnect.index(), WlanEvent::COUNT - 1);
    }
}
