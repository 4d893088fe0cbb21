//! Resource-manager grant/release state machine.
//!
//! Tracks the WLAN producer resource as `Released`, `GrantPending` or
//! `Granted`. State transitions happen inside a critical section; the
//! accelerator is always called outside it so a synchronous grant callback
//! can never re-enter the lock.
//!
//! # Release ordering
//!
//! A release flips the state to `Released` before the accelerator confirms.
//! A concurrent requester therefore never observes `Granted` and skips its
//! own request while the real release is landing. If the accelerator then
//! refuses the release, the state goes back to `Granted` and a reconcile
//! flag is set; the next request probes the accelerator and re-requests if
//! the resource turns out not to be held after all.

use crate::driver::error::HwResult;
use crate::hw::{Accelerator, GrantStatus, HostStack, ResourceName};
use crate::sync::CriticalSectionCell;

/// Authoritative state of the producer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResourceState {
    /// Not held
    #[default]
    Released,
    /// Requested, grant notification outstanding
    GrantPending,
    /// Held
    Granted,
}

/// Result of [`ResourceStateMachine::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GrantOutcome {
    /// Resource is held
    Granted,
    /// Grant is outstanding
    InProgress,
}

/// Result of [`ResourceStateMachine::try_release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReleaseOutcome {
    /// Resource is (now) released
    Released,
    /// Transfers or queued frames still need the resource
    Busy,
    /// A grant is outstanding; nothing to release yet
    InProgress,
}

/// Resource-manager counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RmStats {
    /// Grants completed synchronously
    pub grant_immediate: u64,
    /// Grants completed through the notify callback
    pub grant_deferred: u64,
    /// Releases issued
    pub release: u64,
    /// Releases refused by the accelerator
    pub release_failed: u64,
    /// Releases refused because the resource was busy
    pub release_busy: u64,
    /// Reconciliation probes that found the resource not held
    pub reconciled: u64,
}

#[derive(Debug, Default)]
struct RmInner {
    state: ResourceState,
    wake_lock_held: bool,
    wake_lock_epoch: u64,
    reconcile: bool,
    stats: RmStats,
}

enum RequestStep {
    Done(GrantOutcome),
    Probe,
    Issue,
}

/// Grant/release arbitration for the WLAN producer resource
///
/// With arbitration disabled every request is granted and every release
/// succeeds without touching the accelerator.
#[derive(Debug)]
pub struct ResourceStateMachine {
    enabled: bool,
    inner: CriticalSectionCell<RmInner>,
}

impl ResourceStateMachine {
    /// Create a released state machine
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: CriticalSectionCell::new(RmInner::default()),
        }
    }

    /// Whether arbitration is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current state
    pub fn state(&self) -> ResourceState {
        self.inner.with_ref(|rm| rm.state)
    }

    /// Counter snapshot
    pub fn stats(&self) -> RmStats {
        self.inner.with_ref(|rm| rm.stats)
    }

    /// Whether the wake lock is currently held
    pub fn wake_lock_held(&self) -> bool {
        self.inner.with_ref(|rm| rm.wake_lock_held)
    }

    /// Epoch a wake-lock release timer armed now must carry
    pub fn wake_lock_epoch(&self) -> u64 {
        self.inner.with_ref(|rm| rm.wake_lock_epoch)
    }

    /// Request the resource.
    ///
    /// Idempotent while granted. Any request cancels an armed wake-lock
    /// release and re-takes the wake lock if it was dropped.
    pub fn request(
        &self,
        accel: &dyn Accelerator,
        host: &dyn HostStack,
    ) -> HwResult<GrantOutcome> {
        if !self.enabled {
            return Ok(GrantOutcome::Granted);
        }

        let step = self.inner.with(|rm| match rm.state {
            ResourceState::Granted if rm.reconcile => {
                rm.reconcile = false;
                RequestStep::Probe
            }
            ResourceState::Granted => RequestStep::Done(GrantOutcome::Granted),
            ResourceState::GrantPending => RequestStep::Done(GrantOutcome::InProgress),
            ResourceState::Released => {
                rm.state = ResourceState::GrantPending;
                RequestStep::Issue
            }
        });

        match step {
            RequestStep::Done(outcome) => return Ok(outcome),
            RequestStep::Probe => {
                if accel.resource_held(ResourceName::WlanProd) != Some(false) {
                    return Ok(GrantOutcome::Granted);
                }
                let reissue = self.inner.with(|rm| {
                    if rm.state != ResourceState::Granted {
                        return false;
                    }
                    log::warn!(target: "wlan_offload", "resource not held after failed release, re-requesting");
                    rm.state = ResourceState::GrantPending;
                    rm.stats.reconciled += 1;
                    true
                });
                if !reissue {
                    return Ok(self.outcome_for(self.state()));
                }
            }
            RequestStep::Issue => {}
        }

        let result = accel.request_resource(ResourceName::WlanProd);

        let (outcome, take_wake_lock) = self.inner.with(|rm| {
            let outcome = match result {
                Ok(GrantStatus::Granted) => {
                    if rm.state == ResourceState::GrantPending {
                        rm.state = ResourceState::Granted;
                        rm.stats.grant_immediate += 1;
                    }
                    Ok(GrantOutcome::Granted)
                }
                Ok(GrantStatus::Pending) => Ok(match rm.state {
                    ResourceState::Granted => GrantOutcome::Granted,
                    _ => GrantOutcome::InProgress,
                }),
                Err(e) => {
                    if rm.state == ResourceState::GrantPending {
                        rm.state = ResourceState::Released;
                    }
                    Err(e)
                }
            };
            rm.wake_lock_epoch = rm.wake_lock_epoch.wrapping_add(1);
            let take = !rm.wake_lock_held;
            rm.wake_lock_held = true;
            (outcome, take)
        });

        if take_wake_lock {
            host.wake_lock(true);
        }

        match &outcome {
            Ok(GrantOutcome::Granted) => log::debug!(target: "wlan_offload", "resource granted"),
            Ok(GrantOutcome::InProgress) => log::debug!(target: "wlan_offload", "resource grant pending"),
            Err(e) => log::error!(target: "wlan_offload", "resource request failed: {e}"),
        }
        outcome
    }

    /// Complete an outstanding grant from the notify callback.
    ///
    /// Returns `true` if a pending grant was completed. Safe to call from
    /// interrupt-like context.
    pub fn on_granted(&self) -> bool {
        self.inner.with(|rm| {
            if rm.state == ResourceState::GrantPending {
                rm.state = ResourceState::Granted;
                rm.stats.grant_deferred += 1;
                true
            } else {
                false
            }
        })
    }

    /// Try to release the resource.
    ///
    /// `in_flight` and `queued` are the transmit descriptors currently owned
    /// by the accelerator and the frames parked in the suspend queue; either
    /// being non-zero refuses the release. A refused accelerator release
    /// rolls the state back to `Granted` and returns the error.
    pub fn try_release(
        &self,
        accel: &dyn Accelerator,
        in_flight: u32,
        queued: usize,
    ) -> HwResult<ReleaseOutcome> {
        if !self.enabled {
            return Ok(ReleaseOutcome::Released);
        }

        if in_flight > 0 || queued > 0 {
            self.inner.with(|rm| rm.stats.release_busy += 1);
            log::trace!(target: "wlan_offload", "release refused: in_flight={in_flight} queued={queued}");
            return Ok(ReleaseOutcome::Busy);
        }

        let proceed = self.inner.with(|rm| match rm.state {
            ResourceState::Granted => {
                rm.state = ResourceState::Released;
                rm.stats.release += 1;
                None
            }
            ResourceState::GrantPending => Some(ReleaseOutcome::InProgress),
            ResourceState::Released => Some(ReleaseOutcome::Released),
        });
        if let Some(outcome) = proceed {
            return Ok(outcome);
        }

        match accel.release_resource(ResourceName::WlanProd) {
            Ok(()) => {
                log::debug!(target: "wlan_offload", "resource released");
                Ok(ReleaseOutcome::Released)
            }
            Err(e) => {
                self.inner.with(|rm| {
                    if rm.state == ResourceState::Released {
                        rm.state = ResourceState::Granted;
                    }
                    rm.reconcile = true;
                    rm.stats.release_failed += 1;
                });
                log::warn!(target: "wlan_offload", "resource release failed, rolled back to granted: {e}");
                Err(e)
            }
        }
    }

    /// Drop the wake lock if no request arrived since the timer was armed.
    ///
    /// Returns `true` if the wake lock was released.
    pub fn expire_wake_lock(&self, epoch: u64, host: &dyn HostStack) -> bool {
        let release = self.inner.with(|rm| {
            if rm.wake_lock_epoch != epoch
                || rm.state != ResourceState::Released
                || !rm.wake_lock_held
            {
                return false;
            }
            rm.wake_lock_held = false;
            true
        });
        if release {
            log::debug!(target: "wlan_offload", "wake lock released after inactivity");
            host.wake_lock(false);
        }
        release
    }

    /// Reinitialize to `Released`, dropping the wake lock if held
    pub fn reset(&self, host: &dyn HostStack) {
        let drop_wake_lock = self.inner.with(|rm| {
            rm.state = ResourceState::Released;
            rm.reconcile = false;
            rm.wake_lock_epoch = rm.wake_lock_epoch.wrapping_add(1);
            core::mem::replace(&mut rm.wake_lock_held, false)
        });
        if drop_wake_lock {
            host.wake_lock(false);
        }
    }

    fn outcome_for(&self, state: ResourceState) -> GrantOutcome {
        match state {
            ResourceState::Granted => GrantOutcome::Granted,
            _ => GrantOutcome::InProgress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::error::HwError;
    use crate::test_utils::{AccelCall, MockAccelerator, MockHostStack};

    fn rm() -> ResourceStateMachine {
        ResourceStateMachine::new(true)
    }

    // =========================================================================
    // Request
    // =========================================================================

    #[test]
    fn sync_grant_moves_to_granted() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::Granted));
        assert_eq!(rm.state(), ResourceState::Granted);
        assert_eq!(rm.stats().grant_immediate, 1);
        assert_eq!(host.wake_lock_calls(), vec![true]);
    }

    #[test]
    fn request_while_granted_does_not_call_accelerator() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        for _ in 0..5 {
            assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::Granted));
        }
        assert_eq!(accel.request_count(), 1);
    }

    #[test]
    fn async_grant_reports_in_progress_until_notified() {
        let accel = MockAccelerator::new();
        accel.set_async_grant(true);
        let host = MockHostStack::new();
        let rm = rm();

        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::InProgress));
        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::InProgress));
        assert_eq!(rm.state(), ResourceState::GrantPending);
        assert_eq!(accel.request_count(), 1);

        assert!(rm.on_granted());
        assert_eq!(rm.state(), ResourceState::Granted);
        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::Granted));
        assert_eq!(accel.request_count(), 1);
        assert_eq!(rm.stats().grant_deferred, 1);
    }

    #[test]
    fn stray_grant_notification_ignored() {
        let rm = rm();
        assert!(!rm.on_granted());
        assert_eq!(rm.state(), ResourceState::Released);
    }

    #[test]
    fn hard_request_error_rolls_back_to_released() {
        let accel = MockAccelerator::new();
        accel.set_fail_request(Some(-5));
        let host = MockHostStack::new();
        let rm = rm();
        assert_eq!(rm.request(&accel, &host), Err(HwError::Rejected(-5)));
        assert_eq!(rm.state(), ResourceState::Released);
    }

    #[test]
    fn disabled_machine_always_grants() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = ResourceStateMachine::new(false);
        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::Granted));
        assert_eq!(rm.try_release(&accel, 3, 0), Ok(ReleaseOutcome::Released));
        assert!(accel.calls().is_empty());
    }

    // =========================================================================
    // Release
    // =========================================================================

    #[test]
    fn release_refused_while_in_flight() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        for in_flight in 1..10 {
            assert_eq!(rm.try_release(&accel, in_flight, 0), Ok(ReleaseOutcome::Busy));
            assert_eq!(rm.state(), ResourceState::Granted);
        }
        assert_eq!(rm.try_release(&accel, 0, 2), Ok(ReleaseOutcome::Busy));
        assert_eq!(accel.release_count(), 0);
        assert_eq!(rm.try_release(&accel, 0, 0), Ok(ReleaseOutcome::Released));
        assert_eq!(rm.state(), ResourceState::Released);
        assert_eq!(accel.release_count(), 1);
    }

    #[test]
    fn release_while_pending_is_in_progress() {
        let accel = MockAccelerator::new();
        accel.set_async_grant(true);
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        assert_eq!(rm.try_release(&accel, 0, 0), Ok(ReleaseOutcome::InProgress));
        assert_eq!(rm.state(), ResourceState::GrantPending);
    }

    #[test]
    fn release_when_released_is_noop() {
        let accel = MockAccelerator::new();
        let rm = rm();
        assert_eq!(rm.try_release(&accel, 0, 0), Ok(ReleaseOutcome::Released));
        assert_eq!(accel.release_count(), 0);
    }

    #[test]
    fn failed_release_rolls_back_and_reconciles() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();

        accel.set_fail_release(true);
        assert!(rm.try_release(&accel, 0, 0).is_err());
        assert_eq!(rm.state(), ResourceState::Granted);
        assert_eq!(rm.stats().release_failed, 1);

        // Accelerator reports the resource gone; next request re-issues.
        accel.set_resource_held(Some(false));
        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::Granted));
        assert_eq!(accel.request_count(), 2);
        assert_eq!(rm.stats().reconciled, 1);
    }

    #[test]
    fn reconcile_probe_keeps_grant_when_held() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        accel.set_fail_release(true);
        let _ = rm.try_release(&accel, 0, 0);

        accel.set_resource_held(Some(true));
        assert_eq!(rm.request(&accel, &host), Ok(GrantOutcome::Granted));
        assert_eq!(accel.request_count(), 1);
        assert!(accel.calls().contains(&AccelCall::ResourceHeld));
    }

    // =========================================================================
    // Wake lock
    // =========================================================================

    #[test]
    fn wake_lock_expires_after_release() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        rm.try_release(&accel, 0, 0).unwrap();
        let epoch = rm.wake_lock_epoch();
        assert!(rm.expire_wake_lock(epoch, &host));
        assert!(!rm.wake_lock_held());
        assert_eq!(host.wake_lock_calls(), vec![true, false]);
    }

    #[test]
    fn request_cancels_armed_wake_lock_release() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        rm.try_release(&accel, 0, 0).unwrap();
        let epoch = rm.wake_lock_epoch();

        rm.request(&accel, &host).unwrap();
        rm.try_release(&accel, 0, 0).unwrap();
        assert!(!rm.expire_wake_lock(epoch, &host));
        assert!(rm.wake_lock_held());
        assert_eq!(host.wake_lock_calls(), vec![true]);
    }

    #[test]
    fn wake_lock_kept_while_granted() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        assert!(!rm.expire_wake_lock(rm.wake_lock_epoch(), &host));
    }

    #[test]
    fn reset_returns_to_released() {
        let accel = MockAccelerator::new();
        let host = MockHostStack::new();
        let rm = rm();
        rm.request(&accel, &host).unwrap();
        rm.reset(&host);
        assert_eq!(rm.state(), ResourceState::Released);
        assert!(!rm.wake_lock_held());
        assert_eq!(host.wake_lock_calls(), vec![true, false]);
    }
}
