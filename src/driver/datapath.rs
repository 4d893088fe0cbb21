//! Frame paths between the accelerator, the WLAN firmware and the host.
//!
//! Accelerator-to-WLAN frames (i2w) carry an accelerator buffer token that
//! must go back to the accelerator exactly once: after the firmware reports
//! the transmit complete, or immediately when the frame is dropped. Exception
//! frames (w2i) are frames the accelerator could not route; they are
//! delivered to the host stack, forwarded back out intra-BSS, or both.
//!
//! While the host is suspended both transmits and forwards are parked in
//! the suspend queue and sent by the flush that follows `resume()`.

use crate::classify::{FrameInfo, ForwardAction, classify};
use crate::dma::{PmEntry, SlotId};
use crate::hw::{BufferToken, DataEvent, DeviceMode, Frame, SessionId};
use crate::rm::{ReleaseOutcome, ResourceState};
use crate::session::InterfaceContext;
use crate::worker::{TimerKind, WorkItem};

use super::context::{OffloadContext, Shared};
use super::error::{DatapathError, Result, StateError};

/// Fate of an accelerator-to-WLAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxOutcome {
    /// Handed to the firmware in this descriptor slot
    Sent(SlotId),
    /// Parked until the host resumes
    Queued,
}

/// Fate of an exception frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxOutcome {
    /// Delivered to the host stack
    Delivered,
    /// Forwarded back out of the interface only
    Forwarded,
    /// Forwarded and a copy delivered
    ForwardedAndDelivered,
}

impl Shared {
    // =========================================================================
    // Accelerator to WLAN
    // =========================================================================

    pub(crate) fn i2w(
        &self,
        session: SessionId,
        event: DataEvent,
        token: BufferToken,
        frame: Frame,
    ) -> Result<TxOutcome> {
        if event != DataEvent::Receive {
            log::warn!(target: "wlan_offload", "i2w: unexpected {event:?}");
            self.drop_tx(token, None);
            return Err(DatapathError::UnexpectedEvent.into());
        }
        if let Err(e) = self.ensure_active() {
            self.drop_tx(token, None);
            return Err(e);
        }
        if let Err(e) = self.rm.request(&*self.accel, &*self.host) {
            log::warn!(target: "wlan_offload", "i2w: resource request failed: {e}");
        }

        let entry = match self.pm.park(PmEntry::Tx { session, token, frame }) {
            Ok(()) => {
                log::trace!(target: "wlan_offload", "i2w: session {session} parked while suspended");
                self.counters.with(|c| c.datapath.tx_queued += 1);
                return Ok(TxOutcome::Queued);
            }
            Err(entry) => entry,
        };
        if !self.pm.is_empty() {
            self.pm_flush();
        }
        let PmEntry::Tx { session, token, frame } = entry else {
            return Err(DatapathError::Dropped.into());
        };
        self.send_to_fw(session, token, frame).map(TxOutcome::Sent)
    }

    fn send_to_fw(&self, session: SessionId, token: BufferToken, frame: Frame) -> Result<SlotId> {
        let iface = match self.sessions.lookup(session) {
            Some(iface) if self.host.interface_live(session) => iface,
            _ => {
                log::debug!(target: "wlan_offload", "i2w: session {session} has no live interface");
                self.drop_tx(token, None);
                self.release_resource();
                return Err(DatapathError::InterfaceDown.into());
            }
        };
        if iface.mode == DeviceMode::Sap && self.host.tx_blocked(session) {
            log::trace!(target: "wlan_offload", "i2w: session {session} blocked by channel check");
            self.drop_tx(token, Some(iface.iface_id));
            return Err(DatapathError::TxBlocked.into());
        }
        let Some(slot) = self.pool.acquire(token) else {
            log::warn!(target: "wlan_offload", "i2w: descriptor pool exhausted");
            self.drop_tx(token, Some(iface.iface_id));
            return Err(DatapathError::NoDescriptor.into());
        };
        if self.fw.send_tx(session, slot, frame).is_err() {
            log::warn!(target: "wlan_offload", "i2w: firmware refused frame in slot {slot}");
            let token = self.pool.abort(slot).unwrap_or(token);
            self.drop_tx(token, Some(iface.iface_id));
            return Err(DatapathError::SendFailed.into());
        }
        self.counters.with(|c| c.datapath.tx_sent += 1);
        self.sessions.update_counters(iface.iface_id, |c| c.tx += 1);
        Ok(slot)
    }

    fn drop_tx(&self, token: BufferToken, iface_id: Option<u8>) {
        self.accel.release_buffer(token);
        self.counters.with(|c| c.datapath.tx_dropped += 1);
        if let Some(iface_id) = iface_id {
            self.sessions.update_counters(iface_id, |c| c.tx_dropped += 1);
        }
    }

    pub(crate) fn tx_complete(&self, slot: SlotId) {
        let Some(token) = self.pool.release(slot) else {
            log::warn!(target: "wlan_offload", "completion for idle slot {slot}");
            return;
        };
        self.accel.release_buffer(token);
        self.counters.with(|c| c.datapath.tx_completed += 1);
        self.release_resource();
    }

    /// Try to give the producer resource back, arming the wake-lock timer
    /// when it is released
    pub(crate) fn release_resource(&self) {
        match self.rm.try_release(&*self.accel, self.pool.in_flight(), self.pm.len()) {
            Ok(ReleaseOutcome::Released) => {
                if self.rm.wake_lock_held() {
                    let epoch = self.rm.wake_lock_epoch();
                    self.timers
                        .arm(TimerKind::WakeLockRelease { epoch }, self.config.wake_lock_delay());
                }
            }
            Ok(ReleaseOutcome::Busy | ReleaseOutcome::InProgress) => {}
            Err(e) => log::warn!(target: "wlan_offload", "resource release failed: {e}"),
        }
    }

    /// Send everything parked while suspended
    pub(crate) fn pm_flush(&self) {
        let batch = self.pm.drain();
        if batch.is_empty() {
            return;
        }
        log::debug!(target: "wlan_offload", "flushing {} parked frames", batch.len());
        for entry in batch {
            let sent = match entry {
                PmEntry::Tx { session, token, frame } => {
                    self.send_to_fw(session, token, frame).is_ok()
                }
                PmEntry::Exception { session, frame } => self.transmit_exception(session, frame),
            };
            if sent {
                self.counters.with(|c| c.datapath.pm_flushed += 1);
            }
        }
    }

    // =========================================================================
    // WLAN to Host
    // =========================================================================

    pub(crate) fn w2i(
        &self,
        session: SessionId,
        event: DataEvent,
        frame: Frame,
        fw_desc: u8,
    ) -> Result<RxOutcome> {
        if event != DataEvent::Receive {
            log::warn!(target: "wlan_offload", "w2i: unexpected {event:?}");
            return Err(DatapathError::UnexpectedEvent.into());
        }
        self.ensure_active()?;
        let Some(iface) = self.sessions.lookup(session) else {
            log::debug!(target: "wlan_offload", "w2i: session {session} not mapped");
            self.counters.with(|c| c.datapath.rx_dropped += 1);
            return Err(DatapathError::InterfaceDown.into());
        };
        self.counters.with(|c| c.datapath.rx_exception += 1);
        self.sessions.update_counters(iface.iface_id, |c| c.rx_exception += 1);

        let info = match classify(&frame) {
            Ok(info) => info,
            Err(e) => {
                self.drop_rx(&iface);
                return Err(e.into());
            }
        };

        let peer = if iface.mode == DeviceMode::Sta { iface.mac } else { info.src };
        if iface.mode == DeviceMode::Sap && info.is_eapol() && info.dst != iface.mac {
            log::debug!(target: "wlan_offload", "w2i: EAPOL not addressed to the SAP, dropping");
            self.drop_rx(&iface);
            return Err(DatapathError::Dropped.into());
        }
        if !info.is_key_exchange() && self.fw.peer_authorized(session, peer) == Some(false) {
            log::trace!(target: "wlan_offload", "w2i: peer not authorized, dropping");
            self.drop_rx(&iface);
            return Err(DatapathError::Dropped.into());
        }

        let action = if iface.mode == DeviceMode::Sap && self.host.intra_bss_forwarding(session) {
            ForwardAction::from_fw_desc(fw_desc)
        } else {
            ForwardAction::Deliver
        };
        log::trace!(target: "wlan_offload", "w2i: session {session} {action:?}");

        match action {
            ForwardAction::Deliver => {
                self.deliver(&iface, &info, frame)?;
                Ok(RxOutcome::Delivered)
            }
            ForwardAction::ForwardAndDeliver => {
                let forwarded = self.forward(session, frame.clone());
                self.deliver(&iface, &info, frame)?;
                Ok(if forwarded {
                    RxOutcome::ForwardedAndDelivered
                } else {
                    RxOutcome::Delivered
                })
            }
            ForwardAction::ForwardOnly => {
                if self.forward(session, frame) {
                    Ok(RxOutcome::Forwarded)
                } else {
                    self.drop_rx(&iface);
                    Err(DatapathError::Dropped.into())
                }
            }
        }
    }

    fn deliver(&self, iface: &InterfaceContext, info: &FrameInfo, frame: Frame) -> Result<()> {
        if iface.mode == DeviceMode::Sap && info.dhcp {
            self.host.dhcp_indication(iface.session, info.src);
            self.counters.with(|c| c.datapath.dhcp_indications += 1);
        }
        if !self.host.deliver(iface.session, frame) {
            log::debug!(target: "wlan_offload", "w2i: host refused delivery");
            self.drop_rx(iface);
            return Err(DatapathError::Dropped.into());
        }
        self.counters.with(|c| c.datapath.rx_delivered += 1);
        self.sessions.update_counters(iface.iface_id, |c| c.rx_delivered += 1);
        Ok(())
    }

    fn forward(&self, session: SessionId, frame: Frame) -> bool {
        if !self.fw.forward_threshold_ok(session) {
            log::trace!(target: "wlan_offload", "w2i: forward refused by firmware threshold");
            self.counters.with(|c| c.datapath.forward_errors += 1);
            return false;
        }
        match self.pm.park(PmEntry::Exception { session, frame }) {
            Ok(()) => {
                self.counters.with(|c| c.datapath.rx_forwarded += 1);
                true
            }
            Err(PmEntry::Exception { session, frame }) => self.transmit_exception(session, frame),
            Err(PmEntry::Tx { .. }) => false,
        }
    }

    fn transmit_exception(&self, session: SessionId, frame: Frame) -> bool {
        match self.host.transmit(session, frame) {
            Ok(()) => {
                self.counters.with(|c| c.datapath.rx_forwarded += 1);
                true
            }
            Err(_) => {
                log::debug!(target: "wlan_offload", "intra-BSS transmit failed on session {session}");
                self.counters.with(|c| c.datapath.forward_errors += 1);
                false
            }
        }
    }

    fn drop_rx(&self, iface: &InterfaceContext) {
        self.counters.with(|c| c.datapath.rx_dropped += 1);
        self.sessions.update_counters(iface.iface_id, |c| c.rx_dropped += 1);
    }
}

impl OffloadContext {
    /// Host suspend.
    ///
    /// Refused with [`StateError::Busy`] while frames are in flight or the
    /// producer resource is still held.
    pub fn suspend(&self) -> Result<()> {
        let shared = &self.shared;
        shared.ensure_active()?;
        let in_flight = shared.pool.in_flight();
        let held = shared.rm.is_enabled() && shared.rm.state() != ResourceState::Released;
        if in_flight > 0 || held {
            log::debug!(target: "wlan_offload", "suspend refused: in_flight={in_flight} held={held}");
            return Err(StateError::Busy.into());
        }
        shared.pm.set_suspended(true);
        log::info!(target: "wlan_offload", "suspended");
        Ok(())
    }

    /// Host resume; parked frames are sent by the worker
    pub fn resume(&self) -> Result<()> {
        self.shared.ensure_active()?;
        self.shared.pm.set_suspended(false);
        self.shared.post(WorkItem::PmFlush);
        log::info!(target: "wlan_offload", "resumed");
        Ok(())
    }

    /// Drop everything parked in the suspend queue, returning the count
    pub fn flush(&self) -> Result<usize> {
        self.shared.ensure_active()?;
        let dropped = self.shared.pm.clear();
        for entry in &dropped {
            if let PmEntry::Tx { token, .. } = entry {
                self.shared.accel.release_buffer(*token);
            }
        }
        if !dropped.is_empty() {
            log::debug!(target: "wlan_offload", "dropped {} parked frames", dropped.len());
        }
        Ok(dropped.len())
    }
}
