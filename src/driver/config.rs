//! Configuration types for the WLAN offload coordinator

use core::time::Duration;

use crate::constants::{
    DEFAULT_BUS_BW_HIGH_THRESHOLD, DEFAULT_BUS_BW_MEDIUM_THRESHOLD, DEFAULT_BW_PROBE_INTERVAL_MS,
    DEFAULT_HIGH_BANDWIDTH_MBPS, DEFAULT_LOW_BANDWIDTH_MBPS, DEFAULT_MEDIUM_BANDWIDTH_MBPS,
    DEFAULT_TX_DESC_POOL_SIZE, METERING_WAIT_MS, PENDING_EVENT_CAPACITY,
    RESOURCE_COMPLETION_WAIT_MS, RX_INACTIVITY_DELAY_MS,
};
use crate::driver::error::{ConfigError, ConfigResult};

// =============================================================================
// Feature Flags
// =============================================================================

/// Offload feature bitmask, as carried in the driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeatureFlags(u32);

impl FeatureFlags {
    /// Offload enabled at all
    pub const ENABLE: Self = Self(1 << 0);
    /// Pre-filtering in the accelerator
    pub const PRE_FILTER: Self = Self(1 << 1);
    /// IPv6 offload
    pub const IPV6: Self = Self(1 << 2);
    /// Resource manager arbitration of the producer resource
    pub const RM: Self = Self(1 << 3);
    /// Bandwidth-driven clock scaling
    pub const CLK_SCALING: Self = Self(1 << 4);
    /// Micro-controller (uC) data path
    pub const UC: Self = Self(1 << 5);
    /// uC data path for STA interfaces
    pub const UC_STA: Self = Self(1 << 6);
    /// Real-time debug sampling
    pub const RT_DEBUG: Self = Self(1 << 8);

    /// No features
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from a raw bitmask
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every bit in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two masks
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Mask with the bits of `other` cleared
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl core::ops::BitOr for FeatureFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// How ring memory is addressed by the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressingMode {
    /// Physical addresses handed over directly
    #[default]
    Physical,
    /// Addresses translated through the SMMU; rx hash tables must be mapped
    Smmu,
}

/// Subsystem lifecycle state checked at every entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubsystemState {
    /// Normal operation
    #[default]
    Active,
    /// Firmware/accelerator reload in progress
    Restarting,
}

// =============================================================================
// Bandwidth Configuration
// =============================================================================

/// Packet-rate thresholds and accelerator bandwidth levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BandwidthConfig {
    /// Bus bandwidth high threshold (packets per sample)
    pub high_threshold: u64,
    /// Bus bandwidth medium threshold (packets per sample)
    pub medium_threshold: u64,
    /// High bandwidth profile in Mbps
    pub high_mbps: u32,
    /// Medium bandwidth profile in Mbps
    pub medium_mbps: u32,
    /// Low bandwidth profile in Mbps
    pub low_mbps: u32,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthConfig {
    /// Create with driver defaults
    #[must_use]
    pub const fn new() -> Self {
        Self {
            high_threshold: DEFAULT_BUS_BW_HIGH_THRESHOLD,
            medium_threshold: DEFAULT_BUS_BW_MEDIUM_THRESHOLD,
            high_mbps: DEFAULT_HIGH_BANDWIDTH_MBPS,
            medium_mbps: DEFAULT_MEDIUM_BANDWIDTH_MBPS,
            low_mbps: DEFAULT_LOW_BANDWIDTH_MBPS,
        }
    }

    /// Set the packet-rate thresholds
    #[must_use]
    pub const fn with_thresholds(mut self, medium: u64, high: u64) -> Self {
        self.medium_threshold = medium;
        self.high_threshold = high;
        self
    }

    /// Set the bandwidth levels
    #[must_use]
    pub const fn with_levels(mut self, low: u32, medium: u32, high: u32) -> Self {
        self.low_mbps = low;
        self.medium_mbps = medium;
        self.high_mbps = high;
        self
    }

    /// Check ordering of thresholds and levels
    pub const fn validate(&self) -> ConfigResult<()> {
        if self.high_threshold <= self.medium_threshold
            || self.high_mbps < self.medium_mbps
            || self.medium_mbps < self.low_mbps
            || self.low_mbps == 0
        {
            return Err(ConfigError::InvalidBandwidth);
        }
        Ok(())
    }
}

// =============================================================================
// Offload Configuration
// =============================================================================

/// Immutable coordinator configuration
///
/// Use the builder methods to customize:
/// ```ignore
/// let config = OffloadConfig::new()
///     .with_features(FeatureFlags::ENABLE | FeatureFlags::UC | FeatureFlags::RM)
///     .with_tx_desc_pool_size(512)
///     .with_addressing(AddressingMode::Smmu);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffloadConfig {
    /// Feature bitmask
    pub features: FeatureFlags,
    /// Upper bound on transmit descriptor slots
    pub tx_desc_pool_size: usize,
    /// Ring addressing strategy
    pub addressing: AddressingMode,
    /// Clock-scaling thresholds and levels
    pub bandwidth: BandwidthConfig,
    /// Wake-lock inactivity delay after a release (ms)
    pub wake_lock_delay_ms: u64,
    /// Connection-event wait on an in-flight transition (ms)
    pub resource_wait_ms: u64,
    /// Metering request wait (ms)
    pub metering_wait_ms: u64,
    /// Pending connection-event queue capacity
    pub pending_event_capacity: usize,
    /// Bandwidth calibration probe interval (ms, zero disables)
    pub bw_probe_interval_ms: u64,
    /// Run the pipes for a lone STA connection, without SAP clients
    pub sta_only_offload: bool,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OffloadConfig {
    /// Create a new configuration with defaults
    ///
    /// Offload, uC data path and resource arbitration are enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            features: FeatureFlags::ENABLE.union(FeatureFlags::UC).union(FeatureFlags::RM),
            tx_desc_pool_size: DEFAULT_TX_DESC_POOL_SIZE,
            addressing: AddressingMode::Physical,
            bandwidth: BandwidthConfig::new(),
            wake_lock_delay_ms: RX_INACTIVITY_DELAY_MS,
            resource_wait_ms: RESOURCE_COMPLETION_WAIT_MS,
            metering_wait_ms: METERING_WAIT_MS,
            pending_event_capacity: PENDING_EVENT_CAPACITY,
            bw_probe_interval_ms: DEFAULT_BW_PROBE_INTERVAL_MS,
            sta_only_offload: false,
        }
    }

    // =========================================================================
    // Builder Methods
    // =========================================================================

    /// Set the feature bitmask
    #[must_use]
    pub const fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Set the descriptor pool bound
    #[must_use]
    pub const fn with_tx_desc_pool_size(mut self, size: usize) -> Self {
        self.tx_desc_pool_size = size;
        self
    }

    /// Set the ring addressing strategy
    #[must_use]
    pub const fn with_addressing(mut self, addressing: AddressingMode) -> Self {
        self.addressing = addressing;
        self
    }

    /// Set the clock-scaling configuration
    #[must_use]
    pub const fn with_bandwidth(mut self, bandwidth: BandwidthConfig) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Set the wake-lock inactivity delay
    #[must_use]
    pub const fn with_wake_lock_delay_ms(mut self, delay_ms: u64) -> Self {
        self.wake_lock_delay_ms = delay_ms;
        self
    }

    /// Set the connection-event wait on in-flight transitions
    #[must_use]
    pub const fn with_resource_wait_ms(mut self, wait_ms: u64) -> Self {
        self.resource_wait_ms = wait_ms;
        self
    }

    /// Set the metering response wait
    #[must_use]
    pub const fn with_metering_wait_ms(mut self, wait_ms: u64) -> Self {
        self.metering_wait_ms = wait_ms;
        self
    }

    /// Set the pending-event queue capacity
    #[must_use]
    pub const fn with_pending_event_capacity(mut self, capacity: usize) -> Self {
        self.pending_event_capacity = capacity;
        self
    }

    /// Set the bandwidth probe interval (zero disables)
    #[must_use]
    pub const fn with_bw_probe_interval_ms(mut self, interval_ms: u64) -> Self {
        self.bw_probe_interval_ms = interval_ms;
        self
    }

    /// Enable STA-only offload
    #[must_use]
    pub const fn with_sta_only_offload(mut self, enabled: bool) -> Self {
        self.sta_only_offload = enabled;
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Offload enabled
    pub const fn is_enabled(&self) -> bool {
        self.features.contains(FeatureFlags::ENABLE)
    }

    /// uC data path enabled
    pub const fn uc_enabled(&self) -> bool {
        self.is_enabled() && self.features.contains(FeatureFlags::UC)
    }

    /// uC data path enabled for STA interfaces
    pub const fn uc_sta_enabled(&self) -> bool {
        self.uc_enabled() && self.features.contains(FeatureFlags::UC_STA)
    }

    /// Resource manager arbitration enabled
    pub const fn rm_enabled(&self) -> bool {
        self.is_enabled() && self.features.contains(FeatureFlags::RM)
    }

    /// STA-only offload active (requires the STA uC data path)
    pub const fn sta_only_offload_enabled(&self) -> bool {
        self.uc_sta_enabled() && self.sta_only_offload
    }

    /// Clock scaling enabled
    pub const fn clk_scaling_enabled(&self) -> bool {
        self.is_enabled() && self.features.contains(FeatureFlags::CLK_SCALING)
    }

    /// Wake-lock inactivity delay
    pub const fn wake_lock_delay(&self) -> Duration {
        Duration::from_millis(self.wake_lock_delay_ms)
    }

    /// Connection-event wait
    pub const fn resource_wait(&self) -> Duration {
        Duration::from_millis(self.resource_wait_ms)
    }

    /// Metering response wait
    pub const fn metering_wait(&self) -> Duration {
        Duration::from_millis(self.metering_wait_ms)
    }

    /// Bandwidth probe interval, if enabled
    pub const fn bw_probe_interval(&self) -> Option<Duration> {
        if self.bw_probe_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.bw_probe_interval_ms))
        }
    }

    /// Validate the configuration
    pub const fn validate(&self) -> ConfigResult<()> {
        if !self.is_enabled() {
            return Err(ConfigError::OffloadDisabled);
        }
        if self.tx_desc_pool_size == 0 {
            return Err(ConfigError::EmptyDescriptorPool);
        }
        if self.pending_event_capacity == 0 {
            return Err(ConfigError::InvalidConfig);
        }
        self.bandwidth.validate()
    }
}
