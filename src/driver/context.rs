//! Coordinator context and interrupt-side handle.
//!
//! [`OffloadContext`] owns everything: configuration, collaborators, the
//! control state behind a sleep-capable lock, and the interrupt-safe pieces
//! (resource machine, descriptor pool, suspend queue, opcode slots,
//! timers). Callbacks from interrupt-like context go through an
//! [`IsrHandle`], which only touches interrupt-safe state and posts work
//! for the worker.
//!
//! # Lock order
//!
//! The control lock is taken before any [`CriticalSectionCell`]. Nothing
//! that holds a critical section calls a collaborator.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::constants::WORKER_IDLE_TICK_MS;
use crate::dispatcher::OpcodeDispatcher;
use crate::dma::{SlotId, SuspendResumeQueue, TxDescriptorPool};
use crate::hw::{
    Accelerator, AcceleratorMessage, AddressingStrategy, BufferToken, DataEvent, Firmware, Frame,
    HostStack, SessionId, WlanEvent, strategy_for,
};
use crate::pending::PendingEventQueue;
use crate::pipe::{PipeHw, PipeLifecycleContext, PipeLifecycleManager, PipePhase};
use crate::rm::{ResourceState, ResourceStateMachine};
use crate::session::{InterfaceContext, SessionDirectory, StationTable};
use crate::sync::CriticalSectionCell;
use crate::worker::{self, TimerKind, TimerSet, WorkHandler, WorkItem, WorkQueue, WorkerHandle};

use super::config::{OffloadConfig, SubsystemState};
use super::datapath::{RxOutcome, TxOutcome};
use super::error::{Error, HwResult, Result, StateError};
use super::metering::Metering;
use super::perf::PerfState;
use super::stats::{Counters, OffloadStats};

/// State only touched under the control lock
#[derive(Debug)]
pub(crate) struct ControlState {
    pub(crate) pipes: PipeLifecycleManager,
    pub(crate) pending: PendingEventQueue,
    pub(crate) stations: StationTable,
    /// Firmware image loaded and pipes connectable
    pub(crate) uc_loaded: bool,
    /// WDI enable sent to the accelerator
    pub(crate) wdi_enabled: bool,
    pub(crate) sta_connected: bool,
    pub(crate) mcc_mode: bool,
    pub(crate) perf: PerfState,
    pub(crate) event_counts: [u64; WlanEvent::COUNT],
}

impl ControlState {
    fn new(pending_capacity: usize) -> Self {
        Self {
            pipes: PipeLifecycleManager::new(),
            pending: PendingEventQueue::new(pending_capacity),
            stations: StationTable::new(),
            uc_loaded: false,
            wdi_enabled: false,
            sta_connected: false,
            mcc_mode: false,
            perf: PerfState::default(),
            event_counts: [0; WlanEvent::COUNT],
        }
    }
}

/// State shared between the owner, interrupt handles and the worker
pub(crate) struct Shared {
    pub(crate) config: OffloadConfig,
    pub(crate) accel: Arc<dyn Accelerator>,
    pub(crate) fw: Arc<dyn Firmware>,
    pub(crate) host: Arc<dyn HostStack>,
    pub(crate) addressing: Box<dyn AddressingStrategy>,
    pub(crate) subsystem: CriticalSectionCell<SubsystemState>,
    pub(crate) control: Mutex<ControlState>,
    pub(crate) rm: ResourceStateMachine,
    pub(crate) pool: TxDescriptorPool,
    pub(crate) pm: SuspendResumeQueue,
    pub(crate) sessions: SessionDirectory,
    pub(crate) dispatcher: OpcodeDispatcher,
    pub(crate) timers: TimerSet,
    pub(crate) work: WorkQueue,
    pub(crate) metering: Metering,
    pub(crate) counters: CriticalSectionCell<Counters>,
}

impl Shared {
    pub(crate) fn hw(&self) -> PipeHw<'_> {
        PipeHw {
            accel: &*self.accel,
            fw: &*self.fw,
            addressing: &*self.addressing,
        }
    }

    /// Refuse entry while a subsystem restart is in progress
    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.subsystem.get() {
            SubsystemState::Active => Ok(()),
            SubsystemState::Restarting => {
                log::debug!(target: "wlan_offload", "subsystem restarting, refusing entry");
                Err(StateError::Restarting.into())
            }
        }
    }

    /// Send a control message, counting the outcome
    pub(crate) fn send_message(&self, message: AcceleratorMessage) -> HwResult<()> {
        let result = self.accel.send_message(&message);
        self.counters.with(|c| match result {
            Ok(()) => c.messages.sent += 1,
            Err(_) => c.messages.failed += 1,
        });
        if let Err(e) = &result {
            log::error!(target: "wlan_offload", "message {message:?} failed: {e}");
        }
        result
    }

    pub(crate) fn post(&self, item: WorkItem) {
        if !self.work.post(item) {
            log::error!(target: "wlan_offload", "work queue closed, dropping {item:?}");
        }
    }
}

impl WorkHandler for Shared {
    fn handle(&self, item: WorkItem) {
        match item {
            WorkItem::Opcode(opcode) => self.handle_opcode(opcode),
            WorkItem::ResourceGranted => {
                let mut control = self.control.lock();
                match control.pipes.on_resource_granted(self.hw()) {
                    Ok(true) => log::debug!(target: "wlan_offload", "deferred grant enabled pipes"),
                    Ok(false) => log::debug!(target: "wlan_offload", "deferred grant with nothing to enable"),
                    Err(e) => log::error!(target: "wlan_offload", "deferred grant enable failed: {e}"),
                }
            }
            WorkItem::ResourceReleased => {
                if self.control.lock().pipes.on_resource_released() {
                    log::debug!(target: "wlan_offload", "deferred release finished unload");
                }
            }
            WorkItem::PmFlush => self.pm_flush(),
            WorkItem::Shutdown => {}
        }
    }

    fn fire(&self, timer: TimerKind) {
        match timer {
            TimerKind::WakeLockRelease { epoch } => {
                self.rm.expire_wake_lock(epoch, &*self.host);
            }
            TimerKind::BandwidthProbe => self.bandwidth_probe(),
        }
    }

    fn timers(&self) -> &TimerSet {
        &self.timers
    }
}

// =============================================================================
// Offload Context
// =============================================================================

/// WLAN offload coordinator
///
/// Owns all coordinator state. Connection events, lifecycle calls and
/// metering requests are made on this type from sleep-capable context;
/// interrupt-like callbacks go through [`isr_handle`](Self::isr_handle).
///
/// ```ignore
/// let ctx = OffloadContext::new(OffloadConfig::new(), accel, fw, host)?;
/// ctx.spawn_worker()?;
/// ctx.ol_init()?;
/// let isr = ctx.isr_handle();
/// // from the accelerator's message callback:
/// isr.firmware_message(&bytes)?;
/// ```
pub struct OffloadContext {
    pub(crate) shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl core::fmt::Debug for OffloadContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OffloadContext")
            .field("config", &self.shared.config)
            .field("subsystem", &self.shared.subsystem.get())
            .finish_non_exhaustive()
    }
}

impl OffloadContext {
    /// Create a coordinator in the `Active` state.
    ///
    /// The addressing strategy is chosen once here from the configuration.
    pub fn new(
        config: OffloadConfig,
        accel: Arc<dyn Accelerator>,
        fw: Arc<dyn Firmware>,
        host: Arc<dyn HostStack>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            config,
            accel,
            fw,
            host,
            addressing: strategy_for(config.addressing),
            subsystem: CriticalSectionCell::new(SubsystemState::Active),
            control: Mutex::new(ControlState::new(config.pending_event_capacity)),
            rm: ResourceStateMachine::new(config.rm_enabled()),
            pool: TxDescriptorPool::new(),
            pm: SuspendResumeQueue::new(),
            sessions: SessionDirectory::new(),
            dispatcher: OpcodeDispatcher::new(),
            timers: TimerSet::new(),
            work: WorkQueue::new(),
            metering: Metering::new(),
            counters: CriticalSectionCell::new(Counters::default()),
        };
        log::info!(target: "wlan_offload", "offload context created ({:?} addressing)", config.addressing);
        Ok(Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        })
    }

    /// Handle for interrupt-like callbacks
    pub fn isr_handle(&self) -> IsrHandle {
        IsrHandle(Arc::clone(&self.shared))
    }

    /// Configuration in effect
    pub fn config(&self) -> &OffloadConfig {
        &self.shared.config
    }

    // =========================================================================
    // Worker
    // =========================================================================

    /// Start the worker thread.
    ///
    /// A second call while the worker runs is a no-op.
    pub fn spawn_worker(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(WorkerHandle::is_running) {
            return Ok(());
        }
        let handle = WorkerHandle::spawn(
            "wlan-offload",
            Arc::clone(&self.shared),
            &self.shared.work,
            Duration::from_millis(WORKER_IDLE_TICK_MS),
        )
        .map_err(|e| {
            log::error!(target: "wlan_offload", "failed to spawn worker: {e}");
            Error::from(StateError::WorkerStopped)
        })?;
        *worker = Some(handle);
        Ok(())
    }

    /// Stop the worker thread and wait for it
    pub fn stop_worker(&self) {
        if let Some(mut handle) = self.worker.lock().take() {
            handle.shutdown();
        }
    }

    /// Whether the worker thread is running
    pub fn worker_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(WorkerHandle::is_running)
    }

    /// Run queued work and due timers on the calling thread.
    ///
    /// Used when no worker thread is spawned. Returns the number of items
    /// and timers run.
    pub fn run_pending_work(&self) -> usize {
        worker::drain(&*self.shared, &self.shared.work)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Subsystem state
    pub fn subsystem_state(&self) -> SubsystemState {
        self.shared.subsystem.get()
    }

    /// Coarse pipe phase
    pub fn pipe_phase(&self) -> PipePhase {
        self.shared.control.lock().pipes.phase()
    }

    /// Pipe transition flags
    pub fn pipe_context(&self) -> PipeLifecycleContext {
        self.shared.control.lock().pipes.context()
    }

    /// Producer resource state
    pub fn resource_state(&self) -> ResourceState {
        self.shared.rm.state()
    }

    /// Connection events waiting on a transition
    pub fn pending_events(&self) -> usize {
        self.shared.control.lock().pending.len()
    }

    /// Associated SAP stations
    pub fn station_count(&self) -> usize {
        self.shared.control.lock().stations.len()
    }

    /// Offloaded interfaces
    pub fn interfaces(&self) -> Vec<InterfaceContext> {
        self.shared.sessions.interfaces()
    }

    /// Snapshot of every counter
    pub fn stats(&self) -> OffloadStats {
        let s = &*self.shared;
        let control = s.control.lock();
        let (datapath, messages) = s.counters.with_ref(|c| (c.datapath, c.messages));
        OffloadStats {
            resource_state: s.rm.state(),
            rm: s.rm.stats(),
            pipe_context: control.pipes.context(),
            pool: s.pool.stats(),
            pool_counts: s.pool.counts(),
            pm: s.pm.stats(),
            pm_queued: s.pm.len(),
            suspended: s.pm.is_suspended(),
            dispatcher: s.dispatcher.stats(),
            datapath,
            messages,
            events: control.event_counts,
            pending_events: control.pending.len(),
            pending_evicted: control.pending.evicted(),
            stations: control.stations.len(),
            interfaces: s.sessions.interfaces(),
            uc_loaded: control.uc_loaded,
            wdi_enabled: control.wdi_enabled,
            sta_connected: control.sta_connected,
            perf: control.perf.level,
        }
    }
}

// =============================================================================
// Interrupt Handle
// =============================================================================

/// Entry points for callbacks that must not sleep
///
/// Every method takes only critical sections and returns promptly; work
/// that needs the control lock is posted to the worker.
#[derive(Clone)]
pub struct IsrHandle(Arc<Shared>);

impl core::fmt::Debug for IsrHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("IsrHandle").finish()
    }
}

impl IsrHandle {
    /// Accept a raw operation message from the accelerator's channel
    pub fn firmware_message(&self, bytes: &[u8]) -> Result<()> {
        self.0.ensure_active()?;
        if let Some(opcode) = self.0.dispatcher.intake_raw(bytes)? {
            self.0.post(WorkItem::Opcode(opcode));
        }
        Ok(())
    }

    /// Deferred resource grant notification
    pub fn resource_granted(&self) {
        if self.0.rm.on_granted() {
            self.0.post(WorkItem::ResourceGranted);
        } else {
            log::debug!(target: "wlan_offload", "grant notification with no request outstanding");
        }
    }

    /// Deferred resource release notification
    pub fn resource_released(&self) {
        self.0.post(WorkItem::ResourceReleased);
    }

    /// Transmit completion for `slot`.
    ///
    /// Refused while restarting; the slot's buffer is handed back when the
    /// pool is next reallocated.
    pub fn tx_complete(&self, slot: SlotId) -> Result<()> {
        self.0.ensure_active()?;
        self.0.tx_complete(slot);
        Ok(())
    }

    /// Accelerator-to-WLAN data callback
    pub fn i2w(
        &self,
        session: SessionId,
        event: DataEvent,
        token: BufferToken,
        frame: Frame,
    ) -> Result<TxOutcome> {
        self.0.i2w(session, event, token, frame)
    }

    /// WLAN-to-host exception callback
    pub fn w2i(
        &self,
        session: SessionId,
        event: DataEvent,
        frame: Frame,
        fw_desc: u8,
    ) -> Result<RxOutcome> {
        self.0.w2i(session, event, frame, fw_desc)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dispatcher::{OpMessage, Opcode};
    use crate::driver::config::FeatureFlags;
    use crate::hw::{DeviceMode, MacAddr, PipeDirection};
    use crate::test_utils::{MockAccelerator, MockFirmware, MockHostStack};

    /// Coordinator wired to mocks, driven synchronously
    pub(crate) struct Harness {
        pub(crate) accel: Arc<MockAccelerator>,
        pub(crate) fw: Arc<MockFirmware>,
        pub(crate) host: Arc<MockHostStack>,
        pub(crate) ctx: OffloadContext,
        pub(crate) isr: IsrHandle,
    }

    impl Harness {
        /// uC data path and resource arbitration, short waits
        pub(crate) fn new() -> Self {
            Self::with_config(OffloadConfig::new().with_resource_wait_ms(10))
        }

        /// STA offload on top of the defaults
        pub(crate) fn sta() -> Self {
            Self::with_config(
                OffloadConfig::new()
                    .with_features(
                        FeatureFlags::ENABLE
                            | FeatureFlags::UC
                            | FeatureFlags::UC_STA
                            | FeatureFlags::RM,
                    )
                    .with_resource_wait_ms(10),
            )
        }

        pub(crate) fn with_config(config: OffloadConfig) -> Self {
            let accel = Arc::new(MockAccelerator::new());
            let fw = Arc::new(MockFirmware::new());
            let host = Arc::new(MockHostStack::new());
            let ctx = OffloadContext::new(
                config,
                Arc::clone(&accel) as Arc<dyn Accelerator>,
                Arc::clone(&fw) as Arc<dyn Firmware>,
                Arc::clone(&host) as Arc<dyn HostStack>,
            )
            .unwrap();
            let isr = ctx.isr_handle();
            Self {
                accel,
                fw,
                host,
                ctx,
                isr,
            }
        }

        /// Deliver a message and run the resulting work
        pub(crate) fn firmware_message(&self, msg: OpMessage) {
            self.isr.firmware_message(&msg.encode()).unwrap();
            self.ctx.run_pending_work();
        }

        /// Initialize and report the firmware image loaded
        pub(crate) fn load(&self) {
            self.ctx.ol_init().unwrap();
            self.firmware_message(OpMessage::new(Opcode::Ready));
        }

        pub(crate) fn resume_both(&self) {
            self.firmware_message(OpMessage::new(Opcode::TxResume));
            self.firmware_message(OpMessage::new(Opcode::RxResume));
        }

        pub(crate) fn suspend_both(&self) {
            self.firmware_message(OpMessage::new(Opcode::RxSuspend));
            self.firmware_message(OpMessage::new(Opcode::TxSuspend));
        }

        pub(crate) fn event(
            &self,
            session: SessionId,
            mode: DeviceMode,
            event: WlanEvent,
            mac: MacAddr,
            station: Option<u8>,
        ) -> Result<()> {
            self.ctx.wlan_event(session, mode, event, mac, station)
        }

        /// SAP up with one client and both pipes resumed
        pub(crate) fn sap_with_client(&self) {
            use crate::test_utils::{CLIENT_MAC, SAP_MAC};
            self.load();
            self.event(0, DeviceMode::Sap, WlanEvent::ApConnect, SAP_MAC, None).unwrap();
            self.event(0, DeviceMode::Sap, WlanEvent::ClientConnectEx, CLIENT_MAC, Some(1))
                .unwrap();
            self.resume_both();
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let accel: Arc<dyn Accelerator> = Arc::new(MockAccelerator::new());
        let fw: Arc<dyn Firmware> = Arc::new(MockFirmware::new());
        let host: Arc<dyn HostStack> = Arc::new(MockHostStack::new());
        let config = OffloadConfig::new().with_tx_desc_pool_size(0);
        assert!(matches!(
            OffloadContext::new(config, accel, fw, host),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn starts_active_with_pipes_down() {
        let h = Harness::new();
        assert_eq!(h.ctx.subsystem_state(), SubsystemState::Active);
        assert_eq!(h.ctx.pipe_phase(), PipePhase::PipesDown);
        assert_eq!(h.ctx.resource_state(), ResourceState::Released);
        assert_eq!(h.ctx.pending_events(), 0);
    }

    #[test]
    fn malformed_message_rejected_at_intake() {
        let h = Harness::new();
        assert!(h.isr.firmware_message(&[0, 0]).is_err());
        assert_eq!(h.ctx.run_pending_work(), 0);
        assert_eq!(h.ctx.stats().dispatcher.malformed, 1);
    }

    #[test]
    fn stray_grant_posts_nothing() {
        let h = Harness::new();
        h.isr.resource_granted();
        assert_eq!(h.ctx.run_pending_work(), 0);
    }

    // =========================================================================
    // Worker Thread
    // =========================================================================

    #[test]
    fn worker_thread_processes_resume_acknowledgements() {
        use crate::test_utils::{CLIENT_MAC, SAP_MAC};

        let h = Harness::new();
        h.load();
        h.ctx.spawn_worker().unwrap();
        assert!(h.ctx.worker_running());

        h.event(0, DeviceMode::Sap, WlanEvent::ApConnect, SAP_MAC, None).unwrap();
        h.event(0, DeviceMode::Sap, WlanEvent::ClientConnectEx, CLIENT_MAC, Some(3))
            .unwrap();
        h.isr.firmware_message(&OpMessage::new(Opcode::TxResume).encode()).unwrap();
        h.isr.firmware_message(&OpMessage::new(Opcode::RxResume).encode()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !h.ctx.stats().wdi_enabled && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        h.ctx.stop_worker();
        assert!(!h.ctx.worker_running());
        assert_eq!(h.ctx.pipe_phase(), PipePhase::Enabled);
        assert!(h.ctx.stats().wdi_enabled);
        assert_eq!(
            h.fw.pipe_activity(),
            vec![(PipeDirection::Tx, true), (PipeDirection::Rx, true)]
        );
    }
}
