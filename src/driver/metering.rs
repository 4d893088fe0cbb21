//! Tethering data metering.
//!
//! Sharing statistics and quota updates are request/response exchanges
//! with the firmware. The caller blocks on a completion until the worker
//! decodes the answer or the metering wait expires.

use crate::dispatcher::{QuotaResponse, SharingStats};
use crate::sync::{Completion, CriticalSectionCell};

use super::context::OffloadContext;
use super::error::{HwError, Result};

#[derive(Debug, Default)]
struct Answers {
    sharing: Option<SharingStats>,
    quota: Option<QuotaResponse>,
}

/// Outstanding metering exchanges
#[derive(Debug)]
pub(crate) struct Metering {
    sharing_done: Completion,
    quota_done: Completion,
    answers: CriticalSectionCell<Answers>,
}

impl Metering {
    pub(crate) fn new() -> Self {
        Self {
            sharing_done: Completion::new(),
            quota_done: Completion::new(),
            answers: CriticalSectionCell::new(Answers::default()),
        }
    }

    pub(crate) fn sharing_ready(&self, stats: SharingStats) {
        log::debug!(target: "wlan_offload", "sharing stats received");
        self.answers.with(|a| a.sharing = Some(stats));
        self.sharing_done.complete();
    }

    pub(crate) fn quota_ready(&self, rsp: QuotaResponse) {
        log::debug!(
            target: "wlan_offload",
            "quota response success={} bytes={}",
            rsp.success,
            rsp.quota_bytes
        );
        self.answers.with(|a| a.quota = Some(rsp));
        self.quota_done.complete();
    }

    fn arm_sharing(&self) {
        self.answers.with(|a| a.sharing = None);
        self.sharing_done.reset();
    }

    fn arm_quota(&self) {
        self.answers.with(|a| a.quota = None);
        self.quota_done.reset();
    }
}

impl OffloadContext {
    /// Fetch tethering statistics, optionally resetting the firmware
    /// counters.
    ///
    /// Fails with [`HwError::Timeout`] if the firmware does not answer
    /// within the metering wait.
    pub fn sharing_stats(&self, reset: bool) -> Result<SharingStats> {
        let shared = &*self.shared;
        shared.ensure_active()?;
        shared.metering.arm_sharing();
        shared.fw.request_sharing_stats(reset)?;
        if !shared.metering.sharing_done.wait_timeout(shared.config.metering_wait()) {
            log::error!(target: "wlan_offload", "sharing stats request timed out");
            return Err(HwError::Timeout.into());
        }
        shared
            .metering
            .answers
            .with(|a| a.sharing.take())
            .ok_or_else(|| HwError::Timeout.into())
    }

    /// Set or clear the tethering quota; returns whether the firmware
    /// accepted it
    pub fn set_quota(&self, enable: bool, quota_bytes: u64) -> Result<bool> {
        let shared = &*self.shared;
        shared.ensure_active()?;
        shared.metering.arm_quota();
        let lo = (quota_bytes & 0xffff_ffff) as u32;
        let hi = (quota_bytes >> 32) as u32;
        shared.fw.set_quota(enable, lo, hi)?;
        if !shared.metering.quota_done.wait_timeout(shared.config.metering_wait()) {
            log::error!(target: "wlan_offload", "quota request timed out");
            return Err(HwError::Timeout.into());
        }
        let rsp = shared
            .metering
            .answers
            .with(|a| a.quota.take())
            .ok_or(HwError::Timeout)?;
        if !rsp.success {
            log::warn!(target: "wlan_offload", "firmware rejected quota of {quota_bytes} bytes");
        }
        Ok(rsp.success)
    }
}
