//! Ring addressing strategies.
//!
//! Physical platforms hand ring base addresses to the accelerator as-is.
//! SMMU platforms present I/O virtual addresses and must map the rx hash
//! tables before the pipes run and unmap them once they stop.

use crate::driver::config::AddressingMode;
use crate::driver::error::HwResult;
use crate::hw::{
    ClientId, Firmware, PipeConnectParams, PipeDirection, RingAddress, RingRegion, RingResources,
};

/// Platform-specific handling of ring memory
pub trait AddressingStrategy: Send + Sync {
    /// Mode implemented by this strategy
    fn mode(&self) -> AddressingMode;

    /// Translate a ring region to the address the accelerator expects
    fn address(&self, region: RingRegion) -> RingAddress;

    /// Hook run before pipes are enabled
    fn before_enable(&self, firmware: &dyn Firmware) -> HwResult<()>;

    /// Hook run after pipes are disabled (or an enable is rolled back)
    fn after_disable(&self, firmware: &dyn Firmware) -> HwResult<()>;

    /// Connect parameters for one pipe
    fn pipe_params(&self, direction: PipeDirection, res: &RingResources) -> PipeConnectParams {
        match direction {
            PipeDirection::Tx => PipeConnectParams {
                client: ClientId::Wlan1Cons,
                direction,
                ring: self.address(res.tx_comp_ring),
                ring_size: res.tx_comp_ring.size,
                companion: self.address(res.tx_buffers),
                companion_size: res.tx_buffers.size,
            },
            PipeDirection::Rx => PipeConnectParams {
                client: ClientId::Wlan1Prod,
                direction,
                ring: self.address(res.rx_ready_ring),
                ring_size: res.rx_ready_ring.size,
                companion: self.address(res.rx_proc_done_idx),
                companion_size: res.rx_proc_done_idx.size,
            },
        }
    }
}

/// Physically-addressed rings
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalAddressing;

impl AddressingStrategy for PhysicalAddressing {
    fn mode(&self) -> AddressingMode {
        AddressingMode::Physical
    }

    fn address(&self, region: RingRegion) -> RingAddress {
        RingAddress::Physical(region.base)
    }

    fn before_enable(&self, _firmware: &dyn Firmware) -> HwResult<()> {
        Ok(())
    }

    fn after_disable(&self, _firmware: &dyn Firmware) -> HwResult<()> {
        Ok(())
    }
}

/// SMMU-mapped rings
#[derive(Debug, Clone, Copy, Default)]
pub struct SmmuAddressing;

impl AddressingStrategy for SmmuAddressing {
    fn mode(&self) -> AddressingMode {
        AddressingMode::Smmu
    }

    fn address(&self, region: RingRegion) -> RingAddress {
        RingAddress::Iova(region.base)
    }

    fn before_enable(&self, firmware: &dyn Firmware) -> HwResult<()> {
        firmware.map_rx_hash(true).inspect_err(|e| {
            log::error!(target: "wlan_offload", "rx hash SMMU map failed: {e}");
        })
    }

    fn after_disable(&self, firmware: &dyn Firmware) -> HwResult<()> {
        firmware.map_rx_hash(false).inspect_err(|e| {
            log::error!(target: "wlan_offload", "rx hash SMMU unmap failed: {e}");
        })
    }
}

/// Pick the strategy for a configured mode
pub fn strategy_for(mode: AddressingMode) -> Box<dyn AddressingStrategy> {
    match mode {
        AddressingMode::Physical => Box::new(PhysicalAddressing),
        AddressingMode::Smmu => Box::new(SmmuAddressing),
    }
}
