//! Worker-side handling of firmware operation messages.
//!
//! Resume and suspend acknowledgements finish pipe transitions and replay
//! the events queued behind them. The ready message connects the pipes.
//! Statistics feed either the debug log or bandwidth calibration, and
//! metering responses wake the waiting requester.

use crate::dispatcher::{Dispatch, Opcode, QuotaIndication, UcFwStats};
use crate::hw::{AcceleratorMessage, DeviceMode, PipeDirection, ResourceName};
use crate::pending::Phase;

use super::config::SubsystemState;
use super::context::{ControlState, OffloadContext, Shared};
use super::error::{HwError, Result};

impl Shared {
    pub(crate) fn handle_opcode(&self, opcode: Opcode) {
        let Some(msg) = self.dispatcher.take(opcode) else {
            log::debug!(target: "wlan_offload", "{opcode} no longer pending");
            return;
        };
        if self.subsystem.get() == SubsystemState::Restarting {
            log::debug!(target: "wlan_offload", "dropping {opcode} during restart");
            return;
        }
        let Ok(dispatch) = self.dispatcher.decode(&msg) else {
            return;
        };
        log::trace!(target: "wlan_offload", "handling {opcode}");

        let mut control = self.control.lock();
        match dispatch {
            Dispatch::Resumed(direction) => self.on_pipe_resumed(&mut control, direction),
            Dispatch::Suspended(direction) => self.on_pipe_suspended(&mut control, direction),
            Dispatch::DebugStats(stats) => log_fw_stats(&stats),
            Dispatch::BandwidthSample(stats) => self.on_bandwidth_sample(&mut control, &stats),
            Dispatch::Ready => self.on_fw_ready(&mut control),
            Dispatch::SharingStats(stats) => self.metering.sharing_ready(stats),
            Dispatch::QuotaResponse(rsp) => self.metering.quota_ready(rsp),
            Dispatch::QuotaIndication(ind) => self.on_quota_reached(ind),
        }
    }

    fn on_pipe_resumed(&self, control: &mut ControlState, direction: PipeDirection) {
        if !control.pipes.on_resumed(direction) {
            return;
        }
        if !control.wdi_enabled {
            control.wdi_enabled = true;
            if self.send_message(AcceleratorMessage::WdiEnable).is_ok() {
                self.send_mcc_scc(control.mcc_mode);
            }
        }
        self.replay_pending(control, Phase::Loading);
        if control.pipes.take_consumer_pending() {
            log::debug!(target: "wlan_offload", "granting deferred consumer request");
            self.accel.notify_consumer_granted(ResourceName::WlanCons);
        }
    }

    fn on_pipe_suspended(&self, control: &mut ControlState, direction: PipeDirection) {
        if !control.pipes.on_suspended(self.hw(), direction) {
            return;
        }
        if self.rm.is_enabled() {
            self.release_resource();
        }
        self.replay_pending(control, Phase::Unloading);
        if control.pipes.take_consumer_pending() {
            log::debug!(target: "wlan_offload", "dropping consumer request deferred behind unload");
        }
    }

    fn on_fw_ready(&self, control: &mut ControlState) {
        if control.uc_loaded {
            log::debug!(target: "wlan_offload", "firmware ready again, ignoring");
            return;
        }
        control.uc_loaded = true;
        log::info!(target: "wlan_offload", "firmware ready");
        if let Err(e) = self.connect_pipes(control) {
            log::error!(target: "wlan_offload", "pipe connect on ready failed: {e}");
            return;
        }
        let sta_only_up = self.config.sta_only_offload_enabled() && control.sta_connected;
        if !control.stations.is_empty() || sta_only_up {
            if let Err(e) = control.pipes.first_connection(self.hw(), &self.rm, &*self.host) {
                log::error!(target: "wlan_offload", "first connection on ready failed: {e}");
            }
        }
    }

    /// Connect both pipes to the firmware rings and set the initial votes
    pub(crate) fn connect_pipes(&self, control: &mut ControlState) -> Result<()> {
        let resources = self.fw.ring_resources()?;
        if !resources.is_ready() {
            log::error!(target: "wlan_offload", "firmware ring resources not ready");
            return Err(HwError::Unavailable.into());
        }
        control.pipes.connect(self.hw(), &resources)?;
        self.init_perf_level(control);
        Ok(())
    }

    fn on_quota_reached(&self, ind: QuotaIndication) {
        if self.sessions.interface_in_mode(DeviceMode::Sta).is_none() {
            log::error!(target: "wlan_offload", "quota reached with no STA interface");
            return;
        }
        let msg = AcceleratorMessage::QuotaReached {
            quota_bytes: ind.quota_bytes,
        };
        if self.send_message(msg).is_ok() {
            log::info!(target: "wlan_offload", "quota of {} bytes reached", ind.quota_bytes);
        }
    }
}

fn log_fw_stats(stats: &UcFwStats) {
    log::info!(
        target: "wlan_offload",
        "uC tx: comp_ring base={:#x} size={} dbell={:#x} enqueued={} completed={} suspend={}",
        stats.tx_comp_ring_base,
        stats.tx_comp_ring_size,
        stats.tx_comp_ring_dbell_addr,
        stats.tx_pkts_enqueued,
        stats.tx_pkts_completed,
        stats.tx_is_suspend
    );
    log::info!(
        target: "wlan_offload",
        "uC rx: ind_ring base={:#x} size={} dbell={:#x} rd_idx={} refill={} indicated={} \
         drop_no_space={} drop_no_buf={} suspend={}",
        stats.rx_ind_ring_base,
        stats.rx_ind_ring_size,
        stats.rx_ind_ring_dbell_addr,
        stats.rx_ind_ring_rd_idx_cached_val,
        stats.rx_refill_idx,
        stats.rx_num_pkts_indicated,
        stats.rx_num_ind_drop_no_space,
        stats.rx_num_ind_drop_no_buf,
        stats.rx_is_suspend
    );
}

impl OffloadContext {
    /// Arbitrate an accelerator request for the WLAN consumer resource.
    ///
    /// Refused while a pipe transition is in flight; a request refused
    /// during a load is granted when the load completes.
    pub fn consumer_request(&self) -> Result<()> {
        self.shared.ensure_active()?;
        self.shared.control.lock().pipes.consumer_request()?;
        Ok(())
    }
}
