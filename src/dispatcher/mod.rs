//! Firmware opcode intake and routing.
//!
//! Operation messages arrive from the accelerator's asynchronous channel in
//! interrupt-like context. Intake parses the message and parks it in a
//! per-opcode slot under a critical section; the worker then takes it and
//! decodes it into a [`Dispatch`] for the driver to act on.
//!
//! One slot per opcode means a second message of the same opcode arriving
//! before the worker ran is dropped with a warning.

pub mod message;

pub use message::{
    OP_MSG_HEADER_LEN, OpMessage, Opcode, QuotaIndication, QuotaResponse, SharingStats, UcFwStats,
};

use crate::driver::error::MessageError;
use crate::hw::PipeDirection;
use crate::sync::CriticalSectionCell;

/// Why a statistics snapshot was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatsReason {
    /// Debug dump
    #[default]
    Debug,
    /// Bandwidth calibration sampling
    BandwidthCalibration,
}

/// A decoded opcode ready for handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A firmware pipe resumed
    Resumed(PipeDirection),
    /// A firmware pipe suspended
    Suspended(PipeDirection),
    /// Statistics for the debug dump
    DebugStats(UcFwStats),
    /// Statistics for bandwidth calibration
    BandwidthSample(UcFwStats),
    /// Firmware image loaded
    Ready,
    /// Sharing statistics response
    SharingStats(SharingStats),
    /// Quota response
    QuotaResponse(QuotaResponse),
    /// Quota reached
    QuotaIndication(QuotaIndication),
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispatcherStats {
    /// Messages accepted into a slot
    pub accepted: u64,
    /// Messages dropped because their slot was occupied
    pub duplicates: u64,
    /// Messages that failed to parse or decode
    pub malformed: u64,
    /// Messages with an unknown opcode
    pub unknown: u64,
    /// Messages discarded by cancellation
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Slots {
    pending: [Option<OpMessage>; Opcode::COUNT],
    reason: StatsReason,
    stats: DispatcherStats,
}

/// Per-opcode intake slots and decoder
#[derive(Debug, Default)]
pub struct OpcodeDispatcher {
    inner: CriticalSectionCell<Slots>,
}

impl OpcodeDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a parsed message; `false` if its slot is already occupied
    pub fn intake(&self, msg: OpMessage) -> bool {
        let opcode = msg.opcode;
        let accepted = self.inner.with(|slots| {
            let slot = &mut slots.pending[opcode.index()];
            if slot.is_some() {
                slots.stats.duplicates += 1;
                return false;
            }
            *slot = Some(msg);
            slots.stats.accepted += 1;
            true
        });
        if !accepted {
            log::warn!(target: "wlan_offload", "opcode {opcode} already pending, dropping duplicate");
        }
        accepted
    }

    /// Parse raw bytes and park the message.
    ///
    /// Returns the opcode if accepted, `None` for a dropped duplicate.
    pub fn intake_raw(&self, bytes: &[u8]) -> Result<Option<Opcode>, MessageError> {
        let msg = OpMessage::parse(bytes).inspect_err(|e| {
            self.inner.with(|slots| match e {
                MessageError::UnknownOpcode(_) => slots.stats.unknown += 1,
                _ => slots.stats.malformed += 1,
            });
            log::error!(target: "wlan_offload", "discarding firmware message: {e}");
        })?;
        let opcode = msg.opcode;
        Ok(self.intake(msg).then_some(opcode))
    }

    /// Take the parked message for `opcode`
    pub fn take(&self, opcode: Opcode) -> Option<OpMessage> {
        self.inner.with(|slots| slots.pending[opcode.index()].take())
    }

    /// Discard every parked message, returning how many were dropped
    pub fn cancel_all(&self) -> usize {
        self.inner.with(|slots| {
            let dropped = slots
                .pending
                .iter_mut()
                .filter_map(Option::take)
                .count();
            slots.stats.cancelled += dropped as u64;
            dropped
        })
    }

    /// Number of parked messages
    pub fn pending_count(&self) -> usize {
        self.inner
            .with_ref(|slots| slots.pending.iter().filter(|slot| slot.is_some()).count())
    }

    /// Record why the next statistics snapshot was requested
    pub fn set_stats_reason(&self, reason: StatsReason) {
        self.inner.with(|slots| slots.reason = reason);
    }

    /// Reason recorded for the outstanding statistics request
    pub fn stats_reason(&self) -> StatsReason {
        self.inner.with_ref(|slots| slots.reason)
    }

    /// Counter snapshot
    pub fn stats(&self) -> DispatcherStats {
        self.inner.with_ref(|slots| slots.stats)
    }

    /// Decode a message into the action it calls for
    pub fn decode(&self, msg: &OpMessage) -> Result<Dispatch, MessageError> {
        let dispatch = match msg.opcode {
            Opcode::TxResume => Ok(Dispatch::Resumed(PipeDirection::Tx)),
            Opcode::RxResume => Ok(Dispatch::Resumed(PipeDirection::Rx)),
            Opcode::TxSuspend => Ok(Dispatch::Suspended(PipeDirection::Tx)),
            Opcode::RxSuspend => Ok(Dispatch::Suspended(PipeDirection::Rx)),
            Opcode::Ready => Ok(Dispatch::Ready),
            Opcode::Stats => UcFwStats::decode(&msg.payload).map(|stats| match self.stats_reason() {
                StatsReason::Debug => Dispatch::DebugStats(stats),
                StatsReason::BandwidthCalibration => Dispatch::BandwidthSample(stats),
            }),
            Opcode::SharingStats => SharingStats::decode(&msg.payload).map(Dispatch::SharingStats),
            Opcode::QuotaResponse => {
                QuotaResponse::decode(&msg.payload).map(Dispatch::QuotaResponse)
            }
            Opcode::QuotaIndication => {
                QuotaIndication::decode(&msg.payload).map(Dispatch::QuotaIndication)
            }
        };
        if let Err(e) = &dispatch {
            self.inner.with(|slots| slots.stats.malformed += 1);
            log::error!(target: "wlan_offload", "invalid {} payload: {e}", msg.opcode);
        }
        dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_opcode_dropped_until_taken() {
        let dispatcher = OpcodeDispatcher::new();
        assert!(dispatcher.intake(OpMessage::new(Opcode::TxResume)));
        assert!(!dispatcher.intake(OpMessage::new(Opcode::TxResume)));
        assert!(dispatcher.intake(OpMessage::new(Opcode::RxResume)));
        assert_eq!(dispatcher.stats().duplicates, 1);
        assert_eq!(dispatcher.pending_count(), 2);

        assert!(dispatcher.take(Opcode::TxResume).is_some());
        assert!(dispatcher.intake(OpMessage::new(Opcode::TxResume)));
    }

    #[test]
    fn intake_raw_counts_bad_messages() {
        let dispatcher = OpcodeDispatcher::new();
        assert!(dispatcher.intake_raw(&[1, 2, 3]).is_err());
        assert!(dispatcher.intake_raw(&[0, 0, 0x40, 0, 0, 0, 0, 0]).is_err());
        let stats = dispatcher.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(dispatcher.pending_count(), 0);

        let bytes = OpMessage::new(Opcode::Ready).encode();
        assert_eq!(dispatcher.intake_raw(&bytes), Ok(Some(Opcode::Ready)));
        assert_eq!(dispatcher.intake_raw(&bytes), Ok(None));
    }

    #[test]
    fn cancel_all_empties_slots() {
        let dispatcher = OpcodeDispatcher::new();
        dispatcher.intake(OpMessage::new(Opcode::TxSuspend));
        dispatcher.intake(OpMessage::new(Opcode::Ready));
        assert_eq!(dispatcher.cancel_all(), 2);
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.take(Opcode::Ready), None);
    }

    #[test]
    fn stats_routed_by_reason() {
        let dispatcher = OpcodeDispatcher::new();
        let msg = OpMessage::with_payload(Opcode::Stats, UcFwStats::default().encode());
        assert!(matches!(dispatcher.decode(&msg), Ok(Dispatch::DebugStats(_))));
        dispatcher.set_stats_reason(StatsReason::BandwidthCalibration);
        assert!(matches!(dispatcher.decode(&msg), Ok(Dispatch::BandwidthSample(_))));
    }

    #[test]
    fn pipe_opcodes_map_to_directions() {
        let dispatcher = OpcodeDispatcher::new();
        let decode = |op| dispatcher.decode(&OpMessage::new(op)).unwrap();
        assert_eq!(decode(Opcode::TxResume), Dispatch::Resumed(PipeDirection::Tx));
        assert_eq!(decode(Opcode::RxSuspend), Dispatch::Suspended(PipeDirection::Rx));
        assert_eq!(decode(Opcode::Ready), Dispatch::Ready);
    }

    #[test]
    fn short_stats_payload_rejected() {
        let dispatcher = OpcodeDispatcher::new();
        let msg = OpMessage::with_payload(Opcode::Stats, vec![0; 8]);
        assert_eq!(dispatcher.decode(&msg), Err(MessageError::TruncatedPayload));
        assert_eq!(dispatcher.stats().malformed, 1);
    }
}
