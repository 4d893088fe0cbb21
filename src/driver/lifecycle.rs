//! Offload bring-up, teardown and subsystem restart.
//!
//! `ol_init`/`ol_deinit` bracket the WLAN datapath lifetime. A firmware
//! subsystem restart is split in two: [`OffloadContext::begin_restart`]
//! tears every piece of state down and refuses new entries, and
//! [`OffloadContext::finish_restart`] reopens the coordinator once the
//! firmware is back. The host then calls `ol_init` again to reconnect the
//! pipes.

use crate::hw::{AcceleratorMessage, DeviceMode, WlanEvent};
use crate::dma::PmEntry;

use super::config::SubsystemState;
use super::context::{OffloadContext, Shared};
use super::error::{ConfigError, Result};
use super::events::ConnEvent;

impl Shared {
    /// Report the channel concurrency mode when STA offload is enabled
    pub(crate) fn send_mcc_scc(&self, mcc: bool) {
        if !self.config.uc_sta_enabled() {
            return;
        }
        let msg = if mcc {
            AcceleratorMessage::SwitchToMcc
        } else {
            AcceleratorMessage::SwitchToScc
        };
        if self.send_message(msg).is_ok() {
            log::debug!(target: "wlan_offload", "channel mode {}", if mcc { "MCC" } else { "SCC" });
        }
    }

    fn release_parked(&self) -> usize {
        let dropped = self.pm.clear();
        for entry in &dropped {
            if let PmEntry::Tx { token, .. } = entry {
                self.accel.release_buffer(*token);
            }
        }
        dropped.len()
    }
}

impl OffloadContext {
    // =========================================================================
    // Bring-up / Teardown
    // =========================================================================

    /// Prepare the offload data path.
    ///
    /// Sizes the descriptor pool to the smaller of the configured bound and
    /// the firmware's buffer capacity, and connects the pipes right away if
    /// the firmware image is already loaded. A no-op without micro-controller
    /// offload.
    pub fn ol_init(&self) -> Result<()> {
        let shared = &*self.shared;
        shared.ensure_active()?;
        if !shared.config.uc_enabled() {
            log::debug!(target: "wlan_offload", "uC offload disabled, skipping init");
            return Ok(());
        }

        shared.sessions.reset_mappings();
        let size = shared.config.tx_desc_pool_size.min(shared.fw.tx_pool_capacity());
        if size == 0 {
            log::error!(target: "wlan_offload", "firmware offers no tx buffers");
            return Err(ConfigError::EmptyDescriptorPool.into());
        }
        for token in shared.pool.allocate(size) {
            shared.accel.release_buffer(token);
        }

        let mut control = shared.control.lock();
        if control.uc_loaded {
            shared.connect_pipes(&mut control)?;
        }
        drop(control);

        shared.arm_bandwidth_probe();
        log::info!(target: "wlan_offload", "offload initialized with {size} tx descriptors");
        Ok(())
    }

    /// Tear the offload data path down.
    ///
    /// Pipes are disabled if up and disconnected if loaded, queued events
    /// are replayed regardless of the phase they waited on, and every
    /// descriptor still in flight is handed back to the accelerator.
    pub fn ol_deinit(&self) -> Result<()> {
        let shared = &*self.shared;
        shared.ensure_active()?;
        if !shared.config.uc_enabled() {
            return Ok(());
        }

        let mut control = shared.control.lock();
        if let Err(e) = control.pipes.force_shutdown(shared.hw()) {
            log::warn!(target: "wlan_offload", "deinit: pipe disable failed: {e}");
        }
        if control.uc_loaded {
            control.pipes.disconnect(shared.hw())?;
        }
        control.pipes.reset();

        let pending = control.pending.drain_all();
        if !pending.is_empty() {
            log::info!(target: "wlan_offload", "deinit: replaying {} queued events", pending.len());
        }
        for event in pending {
            let ev = ConnEvent::from(event);
            if let Err(e) = shared.process_event(&mut control, ev) {
                log::warn!(target: "wlan_offload", "deinit replay of {} failed: {e}", ev.event.as_str());
            }
        }
        drop(control);

        for token in shared.pool.free_all() {
            shared.accel.release_buffer(token);
        }
        shared.dispatcher.cancel_all();
        shared.timers.clear();
        log::info!(target: "wlan_offload", "offload deinitialized");
        Ok(())
    }

    // =========================================================================
    // Subsystem Restart
    // =========================================================================

    /// Firmware went down: drop all offload state and refuse new entries
    /// until [`finish_restart`](Self::finish_restart).
    pub fn begin_restart(&self) {
        let shared = &*self.shared;
        shared.subsystem.set(SubsystemState::Restarting);
        log::info!(target: "wlan_offload", "subsystem restart: tearing down");

        let mut control = shared.control.lock();
        for iface in shared.sessions.interfaces() {
            let event = if iface.mode == DeviceMode::Sap {
                WlanEvent::ApDisconnect
            } else {
                WlanEvent::StaDisconnect
            };
            if let Err(e) = shared.send_message(AcceleratorMessage::Connection {
                event,
                iface_id: iface.iface_id,
                mac: iface.mac,
            }) {
                log::debug!(
                    target: "wlan_offload",
                    "restart: iface {} disconnect not delivered: {e}",
                    iface.iface_id
                );
            }
            shared.cleanup_interface(iface.session);
        }
        shared.sessions.reset_mappings();
        control.stations.clear();
        control.sta_connected = false;
        control.wdi_enabled = false;

        let dropped = control.pending.drain_all().len();
        if dropped > 0 {
            log::warn!(target: "wlan_offload", "restart dropped {dropped} queued events");
        }
        shared.dispatcher.cancel_all();
        shared.rm.reset(&*shared.host);
        control.pipes.reset();
        drop(control);

        shared.timers.clear();
        let parked = shared.release_parked();
        if parked > 0 {
            log::debug!(target: "wlan_offload", "restart dropped {parked} parked frames");
        }
    }

    /// Firmware is back: reopen the coordinator.
    ///
    /// Stale pipe handles are forgotten without calling the accelerator;
    /// the next `ol_init` reconnects them.
    pub fn finish_restart(&self) {
        let shared = &*self.shared;
        let mut control = shared.control.lock();
        control.pipes.reset();
        control.pipes.forget_connection();
        control.uc_loaded = true;
        control.sta_connected = false;
        drop(control);

        shared.subsystem.set(SubsystemState::Active);
        shared.arm_bandwidth_probe();
        log::info!(target: "wlan_offload", "subsystem restart complete");
    }

    // =========================================================================
    // Control Operations
    // =========================================================================

    /// Disable the pipes regardless of any transition in flight.
    ///
    /// Also accepted while restarting.
    pub fn force_pipe_shutdown(&self) -> Result<()> {
        let shared = &*self.shared;
        let mut control = shared.control.lock();
        control.pipes.force_shutdown(shared.hw())
    }

    /// Record a switch between single- and multi-channel concurrency
    pub fn mcc_scc_switch(&self, mcc: bool) -> Result<()> {
        self.shared.ensure_active()?;
        let mut control = self.shared.control.lock();
        control.mcc_mode = mcc;
        self.shared.send_mcc_scc(mcc);
        Ok(())
    }

    /// Tell the accelerator the firmware is about to be restarted
    pub fn fw_rejuvenate(&self) -> Result<()> {
        self.shared.ensure_active()?;
        self.shared
            .send_message(AcceleratorMessage::FwSsrBeforeShutdown)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::config::FeatureFlags;
    use crate::driver::context::tests::Harness;
    use crate::driver::error::{Error, StateError};
    use crate::driver::OffloadConfig;
    use crate::dma::PoolCounts;
    use crate::hw::{BufferToken, DataEvent};
    use crate::pipe::PipePhase;
    use crate::rm::ResourceState;
    use crate::test_utils::{AccelCall, SAP_MAC, client_mac, data_frame};

    fn connect_count(h: &Harness) -> usize {
        h.accel.count(|c| matches!(c, AccelCall::ConnectPipe(_)))
    }

    // =========================================================================
    // Init / Deinit
    // =========================================================================

    #[test]
    fn pool_sized_by_firmware_capacity() {
        let h = Harness::new();
        h.fw.set_capacity(16);
        h.ctx.ol_init().unwrap();
        assert_eq!(
            h.ctx.stats().pool_counts,
            PoolCounts {
                free: 16,
                in_use: 0,
                size: 16,
            }
        );
    }

    #[test]
    fn empty_firmware_pool_rejected() {
        let h = Harness::new();
        h.fw.set_capacity(0);
        assert_eq!(
            h.ctx.ol_init(),
            Err(Error::Config(ConfigError::EmptyDescriptorPool))
        );
    }

    #[test]
    fn init_without_uc_offload_is_noop() {
        let h = Harness::with_config(OffloadConfig::new().with_features(FeatureFlags::ENABLE));
        h.ctx.ol_init().unwrap();
        assert_eq!(h.ctx.stats().pool_counts.size, 0);
        assert!(h.fw.calls().is_empty());
    }

    #[test]
    fn deinit_disables_and_disconnects() {
        let h = Harness::new();
        h.sap_with_client();
        h.isr
            .i2w(0, DataEvent::Receive, BufferToken(5), data_frame(client_mac(1), SAP_MAC))
            .unwrap();

        h.ctx.ol_deinit().unwrap();
        assert_eq!(h.accel.count(|c| matches!(c, AccelCall::DisablePipe(_))), 2);
        assert_eq!(h.accel.count(|c| matches!(c, AccelCall::DisconnectPipe(_))), 2);
        assert_eq!(h.ctx.pipe_phase(), PipePhase::PipesDown);
        assert_eq!(h.ctx.stats().pool_counts, PoolCounts::default());
        assert_eq!(h.accel.released_buffers(), vec![BufferToken(5)]);
    }

    #[test]
    fn deinit_replays_queued_events() {
        let h = Harness::new();
        h.load();
        h.accel.set_async_grant(true);
        h.event(0, DeviceMode::Sap, WlanEvent::ApConnect, SAP_MAC, None).unwrap();
        h.event(0, DeviceMode::Sap, WlanEvent::ClientConnectEx, client_mac(1), Some(1))
            .unwrap();
        h.event(0, DeviceMode::Sap, WlanEvent::ClientDisconnect, client_mac(1), Some(1))
            .unwrap();
        assert_eq!(h.ctx.pending_events(), 1);

        h.ctx.ol_deinit().unwrap();
        assert_eq!(h.ctx.pending_events(), 0);
        assert_eq!(h.ctx.station_count(), 0);
    }

    // =========================================================================
    // Subsystem Restart
    // =========================================================================

    #[test]
    fn restart_tears_everything_down() {
        let h = Harness::new();
        h.sap_with_client();
        h.ctx.begin_restart();

        assert_eq!(h.ctx.subsystem_state(), SubsystemState::Restarting);
        assert_eq!(
            h.accel.messages().last(),
            Some(&AcceleratorMessage::Connection {
                event: WlanEvent::ApDisconnect,
                iface_id: 0,
                mac: SAP_MAC,
            })
        );
        assert_eq!(h.accel.count(|c| matches!(c, AccelCall::DeregisterInterface(0))), 1);
        assert!(h.ctx.interfaces().is_empty());
        assert_eq!(h.ctx.station_count(), 0);
        assert_eq!(h.ctx.resource_state(), ResourceState::Released);
        assert_eq!(h.ctx.pipe_phase(), PipePhase::PipesDown);
        assert!(!h.ctx.stats().wdi_enabled);
        assert_eq!(h.host.wake_lock_calls().last(), Some(&false));
    }

    #[test]
    fn restart_refuses_entries_until_finished() {
        let h = Harness::new();
        h.load();
        h.ctx.begin_restart();
        assert_eq!(h.ctx.ol_init(), Err(Error::State(StateError::Restarting)));

        h.ctx.finish_restart();
        assert_eq!(h.ctx.subsystem_state(), SubsystemState::Active);
        h.ctx.ol_init().unwrap();
        assert_eq!(connect_count(&h), 4);
        assert!(h.ctx.stats().uc_loaded);

        h.event(0, DeviceMode::Sap, WlanEvent::ApConnect, SAP_MAC, None).unwrap();
        h.event(0, DeviceMode::Sap, WlanEvent::ClientConnectEx, client_mac(1), Some(1))
            .unwrap();
        assert_eq!(h.ctx.pipe_phase(), PipePhase::Enabled);
    }

    #[test]
    fn restart_drops_parked_frames() {
        let h = Harness::new();
        h.load();
        h.event(0, DeviceMode::Sap, WlanEvent::ApConnect, SAP_MAC, None).unwrap();
        h.ctx.suspend().unwrap();
        h.isr
            .i2w(0, DataEvent::Receive, BufferToken(8), data_frame(client_mac(1), SAP_MAC))
            .unwrap();

        h.ctx.begin_restart();
        assert_eq!(h.accel.released_buffers(), vec![BufferToken(8)]);
        assert_eq!(h.ctx.stats().pm_queued, 0);
    }

    // =========================================================================
    // Control Operations
    // =========================================================================

    #[test]
    fn forced_shutdown_cancels_load() {
        let h = Harness::new();
        h.load();
        h.accel.set_async_grant(true);
        h.event(0, DeviceMode::Sap, WlanEvent::ApConnect, SAP_MAC, None).unwrap();
        h.event(0, DeviceMode::Sap, WlanEvent::ClientConnectEx, client_mac(1), Some(1))
            .unwrap();
        assert_eq!(h.ctx.pipe_phase(), PipePhase::Enabling);

        h.ctx.force_pipe_shutdown().unwrap();
        assert_eq!(h.ctx.pipe_phase(), PipePhase::PipesDown);
        assert_eq!(h.accel.disable_count(), 0);

        h.event(0, DeviceMode::Sap, WlanEvent::ClientDisconnect, client_mac(1), Some(1))
            .unwrap();
        assert_eq!(h.ctx.pending_events(), 0);
        assert_eq!(h.ctx.station_count(), 0);
    }

    #[test]
    fn control_operations_refused_while_restarting() {
        let h = Harness::sta();
        h.load();
        h.ctx.begin_restart();
        let restarting = Err(Error::State(StateError::Restarting));
        assert_eq!(h.ctx.mcc_scc_switch(true), restarting);
        assert_eq!(h.ctx.fw_rejuvenate(), restarting);
        assert_eq!(h.ctx.set_perf_level(5000, 5000), restarting);
        assert_eq!(h.ctx.ol_deinit(), restarting);
        assert!(h.accel.messages().is_empty());
        assert_eq!(h.accel.count(|c| matches!(c, AccelCall::DisconnectPipe(_))), 0);

        h.ctx.force_pipe_shutdown().unwrap();
    }

    #[test]
    fn channel_mode_reported_only_with_sta_offload() {
        let h = Harness::new();
        h.ctx.mcc_scc_switch(true).unwrap();
        assert!(h.accel.messages().is_empty());

        let h = Harness::sta();
        h.ctx.mcc_scc_switch(true).unwrap();
        assert_eq!(h.accel.messages(), vec![AcceleratorMessage::SwitchToMcc]);
    }

    #[test]
    fn rejuvenate_warns_accelerator() {
        let h = Harness::new();
        h.ctx.fw_rejuvenate().unwrap();
        assert_eq!(
            h.accel.messages(),
            vec![AcceleratorMessage::FwSsrBeforeShutdown]
        );
    }
}
