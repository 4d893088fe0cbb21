//! Connection-lifecycle events.
//!
//! STA and SAP events set up and tear down interface contexts, toggle
//! firmware offload per session, and drive the first-connection and
//! last-disconnection pipe transitions. Every processed event is reported
//! to the accelerator.
//!
//! An event that arrives during a pipe transition waits for it (bounded by
//! the configured resource wait) with the control lock dropped. If the
//! transition is still in flight afterwards the event is queued behind it
//! and replayed when it completes.

use crate::constants::UNMAPPED_IFACE;
use crate::hw::{AcceleratorMessage, DeviceMode, MacAddr, SessionId, WlanEvent, ZERO_MAC};
use crate::pending::{PendingEvent, Phase};
use crate::session::InterfaceContext;

use super::context::{ControlState, OffloadContext, Shared};
use super::error::{Result, SessionError};

/// A connection event on its way through the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnEvent {
    pub(crate) session: SessionId,
    pub(crate) mode: DeviceMode,
    pub(crate) event: WlanEvent,
    pub(crate) mac: MacAddr,
    pub(crate) station_id: Option<u8>,
    /// Taken from the pending queue; its interface may already be gone
    pub(crate) replayed: bool,
}

impl ConnEvent {
    fn pending(self, phase: Phase) -> PendingEvent {
        PendingEvent {
            session: self.session,
            mode: self.mode,
            event: self.event,
            station_id: self.station_id.unwrap_or(0),
            mac: self.mac,
            phase,
        }
    }
}

impl From<PendingEvent> for ConnEvent {
    fn from(pending: PendingEvent) -> Self {
        let is_client = matches!(
            pending.event,
            WlanEvent::ClientConnectEx | WlanEvent::ClientDisconnect
        );
        Self {
            session: pending.session,
            mode: pending.mode,
            event: pending.event,
            mac: pending.mac,
            station_id: is_client.then_some(pending.station_id),
            replayed: true,
        }
    }
}

fn transition_phase(control: &ControlState) -> Phase {
    if control.pipes.context().loading {
        Phase::Loading
    } else {
        Phase::Unloading
    }
}

impl Shared {
    pub(crate) fn wlan_event(&self, ev: ConnEvent) -> Result<()> {
        self.ensure_active()?;
        if ev.mac == ZERO_MAC {
            log::error!(target: "wlan_offload", "{} with zero MAC", ev.event.as_str());
            return Err(SessionError::InvalidMac.into());
        }
        if !ev.mode.is_offloaded() {
            log::debug!(target: "wlan_offload", "{} in {:?} mode not offloaded", ev.event.as_str(), ev.mode);
            return Err(SessionError::UnsupportedMode.into());
        }
        if self.config.uc_enabled() && !self.config.uc_sta_enabled() && ev.mode != DeviceMode::Sap {
            log::debug!(target: "wlan_offload", "{} ignored without STA offload", ev.event.as_str());
            return Ok(());
        }
        let is_client = matches!(ev.event, WlanEvent::ClientConnectEx | WlanEvent::ClientDisconnect);
        if is_client && ev.station_id.is_none() {
            return Err(SessionError::UnknownStation.into());
        }

        let mut control = self.control.lock();
        if self.config.uc_enabled() && control.pipes.in_transition() {
            let completion = control.pipes.completion();
            log::debug!(target: "wlan_offload", "{} waiting on pipe transition", ev.event.as_str());
            drop(control);
            let done = completion.wait_timeout(self.config.resource_wait());
            control = self.control.lock();

            if control.pipes.in_transition() {
                let phase = transition_phase(&control);
                if !done {
                    log::info!(
                        target: "wlan_offload",
                        "{} timed out waiting, queued behind {phase:?}",
                        ev.event.as_str()
                    );
                }
                if let Some(evicted) = control.pending.enqueue(ev.pending(phase)) {
                    log::warn!(
                        target: "wlan_offload",
                        "pending queue full, dropped {} for session {}",
                        evicted.event.as_str(),
                        evicted.session
                    );
                }
                drop(control);
                if ev.event.is_interface_disconnect() {
                    self.cleanup_interface(ev.session);
                }
                return Ok(());
            }
        }
        self.process_event(&mut control, ev)
    }

    /// Apply an event and report it to the accelerator
    pub(crate) fn process_event(&self, control: &mut ControlState, ev: ConnEvent) -> Result<()> {
        control.event_counts[ev.event.index()] += 1;
        log::debug!(
            target: "wlan_offload",
            "{} session={} mode={:?}",
            ev.event.as_str(),
            ev.session,
            ev.mode
        );
        let iface_before = self.sessions.interface_of(ev.session).map(|ctx| ctx.iface_id);

        let notify = match ev.event {
            WlanEvent::StaConnect => self.sta_connect(control, ev)?,
            WlanEvent::ApConnect => self.ap_connect(ev)?,
            WlanEvent::StaDisconnect => self.sta_disconnect(control, ev)?,
            WlanEvent::ApDisconnect => self.ap_disconnect(control, ev)?,
            WlanEvent::ClientConnectEx => self.client_connect(control, ev)?,
            WlanEvent::ClientDisconnect => self.client_disconnect(control, ev)?,
        };

        if notify {
            let iface_id = self
                .sessions
                .interface_of(ev.session)
                .map(|ctx| ctx.iface_id)
                .or(iface_before)
                .unwrap_or(UNMAPPED_IFACE);
            self.send_message(AcceleratorMessage::Connection {
                event: ev.event,
                iface_id,
                mac: ev.mac,
            })?;
        }
        Ok(())
    }

    // =========================================================================
    // Interface Events
    // =========================================================================

    fn sta_connect(&self, control: &mut ControlState, ev: ConnEvent) -> Result<bool> {
        if control.sta_connected {
            log::debug!(target: "wlan_offload", "STA reconnect, dropping previous interface");
            self.cleanup_interface(ev.session);
        }
        self.setup_interface(ev.session, ev.mode, ev.mac)?;

        let sta_only = self.config.sta_only_offload_enabled();
        if self.config.uc_sta_enabled()
            && (!control.stations.is_empty() || sta_only)
            && !control.sta_connected
        {
            self.toggle_offload(ev.session, ev.mode, true);
        }

        if sta_only && control.uc_loaded && control.stations.is_empty() && !control.sta_connected {
            if let Err(e) = control.pipes.first_connection(self.hw(), &self.rm, &*self.host) {
                log::error!(target: "wlan_offload", "STA-only first connection failed: {e}");
                self.toggle_offload(ev.session, ev.mode, false);
                return Err(e);
            }
        }

        self.sessions.map(ev.session)?;
        control.sta_connected = true;
        Ok(true)
    }

    fn ap_connect(&self, ev: ConnEvent) -> Result<bool> {
        if self.sessions.interface_of(ev.session).is_some() {
            log::debug!(target: "wlan_offload", "SAP interface for session {} already set up", ev.session);
            return Ok(false);
        }
        self.setup_interface(ev.session, ev.mode, ev.mac)?;
        if self.config.uc_enabled() {
            self.toggle_offload(ev.session, ev.mode, true);
        }
        self.sessions.map(ev.session)?;
        Ok(true)
    }

    fn sta_disconnect(&self, control: &mut ControlState, ev: ConnEvent) -> Result<bool> {
        if !control.sta_connected {
            log::warn!(target: "wlan_offload", "STA disconnect while not connected");
            return Err(SessionError::NotConnected.into());
        }
        control.sta_connected = false;

        let sta_only = self.config.sta_only_offload_enabled();
        if self.config.uc_enabled() {
            let last = self.other_interfaces(ev.session) == 0
                || (sta_only && control.stations.is_empty());
            if last && control.pipes.fw_active() && !control.pipes.pipes_down() {
                control.pipes.last_disconnection(self.hw());
            }
        }

        if self.config.uc_sta_enabled() && (!control.stations.is_empty() || sta_only) {
            self.toggle_offload(ev.session, ev.mode, false);
            self.sessions.unmap(ev.session);
        }
        self.cleanup_interface(ev.session);
        Ok(true)
    }

    fn ap_disconnect(&self, control: &mut ControlState, ev: ConnEvent) -> Result<bool> {
        if self.sessions.interface_of(ev.session).is_none() && !ev.replayed {
            log::error!(target: "wlan_offload", "SAP disconnect for session {} without interface", ev.session);
            return Err(SessionError::NoInterface.into());
        }

        if self.config.uc_enabled() {
            if self.other_interfaces(ev.session) == 0
                && control.pipes.fw_active()
                && !control.pipes.pipes_down()
            {
                log::warn!(target: "wlan_offload", "SAP stopped with pipes up, forcing last disconnection");
                control.pipes.last_disconnection(self.hw());
            }
            self.toggle_offload(ev.session, ev.mode, false);
            self.sessions.unmap(ev.session);
        }
        self.cleanup_interface(ev.session);
        Ok(true)
    }

    // =========================================================================
    // Client Events
    // =========================================================================

    fn client_connect(&self, control: &mut ControlState, ev: ConnEvent) -> Result<bool> {
        if !self.config.uc_enabled() {
            return Ok(false);
        }
        let station_id = ev.station_id.ok_or(SessionError::UnknownStation)?;
        let iface = self
            .sessions
            .interface_of(ev.session)
            .ok_or(SessionError::NoInterface)?;
        if control.stations.contains(station_id) {
            log::warn!(target: "wlan_offload", "station {station_id} already connected");
            return Err(SessionError::DuplicateStation.into());
        }

        let sta_only = self.config.sta_only_offload_enabled();
        let toggles_sta = self.config.uc_sta_enabled() && control.sta_connected && !sta_only;
        if control.stations.is_empty() && control.uc_loaded {
            if toggles_sta {
                self.set_sta_offload(true);
            }
            if sta_only && control.sta_connected {
                log::debug!(target: "wlan_offload", "pipes already up for STA-only offload");
            } else if let Err(e) = control.pipes.first_connection(self.hw(), &self.rm, &*self.host) {
                log::error!(target: "wlan_offload", "first connection failed: {e}");
                if toggles_sta {
                    self.set_sta_offload(false);
                }
                return Err(e);
            }
        }

        control.stations.add(station_id)?;
        self.send_message(AcceleratorMessage::ClientConnectEx {
            iface_id: iface.iface_id,
            mac: ev.mac,
            station_id,
        })?;
        Ok(false)
    }

    fn client_disconnect(&self, control: &mut ControlState, ev: ConnEvent) -> Result<bool> {
        if !self.config.uc_enabled() {
            return Ok(false);
        }
        let station_id = ev.station_id.ok_or(SessionError::UnknownStation)?;
        if control.stations.is_empty() {
            log::error!(target: "wlan_offload", "client disconnect with no station associated");
            return Ok(false);
        }
        if control.stations.remove(station_id).is_err() {
            log::warn!(target: "wlan_offload", "client disconnect for unknown station {station_id}");
            return Ok(false);
        }

        let sta_only = self.config.sta_only_offload_enabled();
        if control.stations.is_empty()
            && control.uc_loaded
            && !(sta_only && control.sta_connected)
        {
            let pipes = control.pipes.context();
            if !pipes.unloading && control.pipes.fw_active() && !pipes.pipes_down {
                control.pipes.last_disconnection(self.hw());
            }
            if self.config.uc_sta_enabled() && control.sta_connected {
                self.set_sta_offload(false);
            }
        }
        Ok(true)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn other_interfaces(&self, session: SessionId) -> usize {
        self.sessions
            .interfaces()
            .iter()
            .filter(|ctx| ctx.session != session)
            .count()
    }

    fn set_sta_offload(&self, enable: bool) {
        if let Some(sta) = self.sessions.interface_in_mode(DeviceMode::Sta) {
            self.toggle_offload(sta.session, DeviceMode::Sta, enable);
        }
    }

    /// Enable or disable firmware offload for a session.
    ///
    /// Only a change reaches the firmware.
    pub(crate) fn toggle_offload(&self, session: SessionId, mode: DeviceMode, enable: bool) {
        if self.sessions.offload_enabled(session) == enable {
            log::warn!(
                target: "wlan_offload",
                "session {session} offload already {}",
                if enable { "enabled" } else { "disabled" }
            );
            return;
        }
        match self.fw.set_offload(session, mode, enable) {
            Ok(()) => {
                if let Err(e) = self.sessions.set_offload(session, enable) {
                    log::warn!(target: "wlan_offload", "session {session} offload flag: {e}");
                }
            }
            Err(e) => log::error!(target: "wlan_offload", "session {session} offload toggle failed: {e}"),
        }
    }

    pub(crate) fn setup_interface(
        &self,
        session: SessionId,
        mode: DeviceMode,
        mac: MacAddr,
    ) -> Result<InterfaceContext> {
        let ctx = self.sessions.setup_interface(session, mode, mac)?;
        if let Err(e) = self.accel.register_interface(ctx.iface_id, ctx.clients) {
            log::error!(target: "wlan_offload", "iface {} registration failed: {e}", ctx.iface_id);
            self.sessions.cleanup_interface(session);
            return Err(e.into());
        }
        log::debug!(target: "wlan_offload", "iface {} set up for session {session}", ctx.iface_id);
        Ok(ctx)
    }

    pub(crate) fn cleanup_interface(&self, session: SessionId) {
        let Some(ctx) = self.sessions.cleanup_interface(session) else {
            log::debug!(target: "wlan_offload", "session {session} has no interface to clean up");
            return;
        };
        if let Err(e) = self.accel.deregister_interface(ctx.iface_id) {
            log::warn!(target: "wlan_offload", "iface {} deregistration failed: {e}", ctx.iface_id);
        }
        log::debug!(target: "wlan_offload", "iface {} cleaned up", ctx.iface_id);
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Replay events queued behind `phase`, in arrival order
    pub(crate) fn replay_pending(&self, control: &mut ControlState, phase: Phase) {
        let events = control.pending.take_phase(phase);
        if events.is_empty() {
            return;
        }
        log::info!(target: "wlan_offload", "replaying {} events deferred behind {phase:?}", events.len());
        for pending in events {
            if !self.host.interface_live(pending.session) {
                log::debug!(
                    target: "wlan_offload",
                    "dropping deferred {} for vanished session {}",
                    pending.event.as_str(),
                    pending.session
                );
                continue;
            }
            let ev = ConnEvent::from(pending);
            if control.pipes.in_transition() {
                let phase = transition_phase(control);
                control.pending.enqueue(ev.pending(phase));
                continue;
            }
            if let Err(e) = self.process_event(control, ev) {
                log::warn!(target: "wlan_offload", "deferred {} failed: {e}", ev.event.as_str());
            }
        }
    }
}

impl OffloadContext {
    /// Handle a connection-lifecycle event.
    ///
    /// `station_id` is required for client events. During a pipe
    /// transition this blocks for up to the configured resource wait, then
    /// queues the event and returns `Ok`.
    pub fn wlan_event(
        &self,
        session: SessionId,
        mode: DeviceMode,
        event: WlanEvent,
        mac: MacAddr,
        station_id: Option<u8>,
    ) -> Result<()> {
        self.shared.wlan_event(ConnEvent {
            session,
            mode,
            event,
            mac,
            station_id,
            replayed: false,
        })
    }
}
