//! Accelerator bandwidth votes.
//!
//! With clock scaling enabled the consumer and producer profiles follow the
//! packet rate reported by the firmware statistics. Without it both sit at
//! the high profile for as long as the pipes are connected.

use crate::dispatcher::{StatsReason, UcFwStats};
use crate::hw::ResourceName;
use crate::worker::TimerKind;

use super::config::BandwidthConfig;
use super::context::{ControlState, OffloadContext, Shared};

/// Bandwidth votes currently applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PerfLevel {
    /// WLAN consumer vote (Mbps)
    pub cons_mbps: u32,
    /// WLAN producer vote (Mbps)
    pub prod_mbps: u32,
}

/// Turns cumulative firmware counters into per-sample deltas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthSampler {
    prev_tx: u32,
    prev_rx: u32,
}

impl BandwidthSampler {
    /// Create a sampler with zero baselines
    pub const fn new() -> Self {
        Self { prev_tx: 0, prev_rx: 0 }
    }

    /// Deltas since the previous sample; counter wraparound is tolerated
    pub fn sample(&mut self, tx: u32, rx: u32) -> (u32, u32) {
        let deltas = (tx.wrapping_sub(self.prev_tx), rx.wrapping_sub(self.prev_rx));
        self.prev_tx = tx;
        self.prev_rx = rx;
        deltas
    }
}

#[derive(Debug, Default)]
pub(crate) struct PerfState {
    pub(crate) level: PerfLevel,
    pub(crate) sampler: BandwidthSampler,
}

/// Profile for a sample period carrying `packets`
pub const fn next_bandwidth(cfg: &BandwidthConfig, packets: u64) -> u32 {
    if packets > cfg.high_threshold / 2 {
        cfg.high_mbps
    } else if packets > cfg.medium_threshold / 2 {
        cfg.medium_mbps
    } else {
        cfg.low_mbps
    }
}

impl Shared {
    /// Vote for the profiles matching the given packet counts
    pub(crate) fn set_perf_level(&self, control: &mut ControlState, tx_packets: u64, rx_packets: u64) {
        if !self.config.clk_scaling_enabled() {
            return;
        }
        let next = PerfLevel {
            cons_mbps: next_bandwidth(&self.config.bandwidth, tx_packets),
            prod_mbps: next_bandwidth(&self.config.bandwidth, rx_packets),
        };
        self.apply_perf_level(control, next);
    }

    fn apply_perf_level(&self, control: &mut ControlState, next: PerfLevel) {
        let current = control.perf.level;
        if next.cons_mbps != current.cons_mbps {
            match self.accel.set_perf_profile(ResourceName::WlanCons, next.cons_mbps) {
                Ok(()) => control.perf.level.cons_mbps = next.cons_mbps,
                Err(e) => log::error!(target: "wlan_offload", "consumer perf profile failed: {e}"),
            }
        }
        if next.prod_mbps != current.prod_mbps {
            match self.accel.set_perf_profile(ResourceName::WlanProd, next.prod_mbps) {
                Ok(()) => control.perf.level.prod_mbps = next.prod_mbps,
                Err(e) => log::error!(target: "wlan_offload", "producer perf profile failed: {e}"),
            }
        }
        if control.perf.level != current {
            log::debug!(
                target: "wlan_offload",
                "perf level cons={} prod={} Mbps",
                control.perf.level.cons_mbps,
                control.perf.level.prod_mbps
            );
        }
    }

    /// Initial votes once the pipes are connected
    pub(crate) fn init_perf_level(&self, control: &mut ControlState) {
        if self.config.clk_scaling_enabled() {
            self.set_perf_level(control, 0, 0);
        } else {
            let high = self.config.bandwidth.high_mbps;
            self.apply_perf_level(
                control,
                PerfLevel {
                    cons_mbps: high,
                    prod_mbps: high,
                },
            );
        }
    }

    /// Feed a calibration sample into the votes
    pub(crate) fn on_bandwidth_sample(&self, control: &mut ControlState, stats: &UcFwStats) {
        let (tx, rx) = control.perf.sampler.sample(stats.tx_pkts_completed, stats.rx_total());
        log::trace!(target: "wlan_offload", "bandwidth sample tx={tx} rx={rx}");
        self.set_perf_level(control, u64::from(tx), u64::from(rx));
    }

    /// Request a calibration sample and re-arm the probe
    pub(crate) fn bandwidth_probe(&self) {
        self.dispatcher.set_stats_reason(StatsReason::BandwidthCalibration);
        if let Err(e) = self.fw.request_stats() {
            log::warn!(target: "wlan_offload", "bandwidth probe request failed: {e}");
        }
        self.arm_bandwidth_probe();
    }

    pub(crate) fn arm_bandwidth_probe(&self) {
        if let Some(interval) = self.config.bw_probe_interval() {
            self.timers.arm(TimerKind::BandwidthProbe, interval);
        }
    }
}

impl OffloadContext {
    /// Vote for the profiles matching the given packet counts.
    ///
    /// A no-op unless clock scaling is enabled; profiles are only pushed to
    /// the accelerator when they change.
    pub fn set_perf_level(&self, tx_packets: u64, rx_packets: u64) -> super::Result<()> {
        self.shared.ensure_active()?;
        let mut control = self.shared.control.lock();
        self.shared.set_perf_level(&mut control, tx_packets, rx_packets);
        Ok(())
    }

    /// Ask the firmware for a debug statistics dump.
    ///
    /// The answer is logged when it arrives.
    pub fn request_debug_stats(&self) -> super::Result<()> {
        self.shared.ensure_active()?;
        self.shared.dispatcher.set_stats_reason(StatsReason::Debug);
        self.shared.fw.request_stats()?;
        Ok(())
    }
}
