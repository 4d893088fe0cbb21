//! Centralized Constants
//!
//! This module provides a single source of truth for the limits, timeouts and
//! wire values used throughout the offload coordinator.
//!
//! # Organization
//!
//! Constants are grouped by category:
//! - **Table sizes**: interface, session, station and pending-event limits
//! - **Timing**: completion waits and deferred-work delays
//! - **Bandwidth**: accelerator performance profile defaults
//! - **Frame classification**: EtherTypes and firmware descriptor bits
//!
//! # Note
//!
//! Opcode numbering lives with the message decoder (`dispatcher/message.rs`)
//! because it is specific to the firmware command channel.

// =============================================================================
// Table Sizes
// =============================================================================

/// Maximum number of concurrently offloaded virtual interfaces
pub const MAX_IFACE: usize = 3;

/// Maximum number of firmware sessions (virtual devices)
pub const MAX_SESSIONS: usize = 5;

/// Maximum number of associated SAP stations tracked
pub const MAX_STATIONS: usize = 32;

/// Number of hardware transfer pipes (TX and RX)
pub const PIPE_COUNT: u8 = 2;

/// Default capacity of the pending connection-event queue
pub const PENDING_EVENT_CAPACITY: usize = 20;

/// Default upper bound on transmit descriptor slots
pub const DEFAULT_TX_DESC_POOL_SIZE: usize = 1024;

/// Sentinel stored in the session directory for an unmapped session
pub const UNMAPPED_IFACE: u8 = 0xFF;

// =============================================================================
// Timing Constants
// =============================================================================

/// Delay before the wake lock is dropped after a resource release (ms)
pub const RX_INACTIVITY_DELAY_MS: u64 = 1000;

/// Time a connection event waits for an in-flight transition (ms)
pub const RESOURCE_COMPLETION_WAIT_MS: u64 = 100;

/// Time a metering request waits for the firmware response (ms)
pub const METERING_WAIT_MS: u64 = 500;

/// Default bandwidth calibration probe interval (ms); zero disables it
pub const DEFAULT_BW_PROBE_INTERVAL_MS: u64 = 0;

/// Idle tick of the worker thread when no timer is armed (ms)
pub const WORKER_IDLE_TICK_MS: u64 = 50;

// =============================================================================
// Bandwidth
// =============================================================================

/// High accelerator bandwidth profile (Mbps)
pub const DEFAULT_HIGH_BANDWIDTH_MBPS: u32 = 800;

/// Medium accelerator bandwidth profile (Mbps)
pub const DEFAULT_MEDIUM_BANDWIDTH_MBPS: u32 = 400;

/// Low accelerator bandwidth profile (Mbps)
pub const DEFAULT_LOW_BANDWIDTH_MBPS: u32 = 100;

/// Bus bandwidth high threshold (packets per sample period)
pub const DEFAULT_BUS_BW_HIGH_THRESHOLD: u64 = 2000;

/// Bus bandwidth medium threshold (packets per sample period)
pub const DEFAULT_BUS_BW_MEDIUM_THRESHOLD: u64 = 500;

// =============================================================================
// Frame Classification
// =============================================================================

/// MAC address length in bytes
pub const MAC_ADDR_LEN: usize = 6;

/// EAPOL EtherType
pub const ETHERTYPE_EAPOL: u16 = 0x888E;

/// WAPI EtherType
pub const ETHERTYPE_WAPI: u16 = 0x88B4;

/// DHCP server UDP port
pub const DHCP_SERVER_PORT: u16 = 67;

/// DHCP client UDP port
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Firmware rx descriptor bit: forward the frame back out (intra-BSS)
pub const FW_RX_DESC_FORWARD: u8 = 0x1;

/// Firmware rx descriptor bit: do not deliver to the local stack
pub const FW_RX_DESC_DISCARD: u8 = 0x2;
