//! Pipe lifecycle: first-connection and last-disconnection transitions.
//!
//! The two accelerator pipes (TX consumer, RX producer) come up when the
//! first offloaded consumer connects and go down when the last one leaves.
//! Both transitions finish asynchronously: the firmware acknowledges each
//! direction with a resume or suspend opcode, and the transition completes
//! once both have been seen.
//!
//! ```text
//!   PipesDown --first_connection--> Enabling --2x resume--> Enabled
//!       ^                                                      |
//!       +------------2x suspend------ Disabling <--last_disconnection
//! ```
//!
//! The manager lives inside the control state and is only used under the
//! control lock. Its [`Completion`] is shared so callers can wait for a
//! transition after dropping that lock.

use std::sync::Arc;

use crate::constants::PIPE_COUNT;
use crate::driver::error::{Error, HwError, Result, StateError};
use crate::hw::{
    Accelerator, AddressingStrategy, Firmware, HostStack, PipeConnection, PipeDirection,
    RingResources,
};
use crate::rm::{GrantOutcome, ResourceStateMachine};
use crate::sync::Completion;

/// Collaborators the pipe transitions drive
#[derive(Clone, Copy)]
pub struct PipeHw<'a> {
    /// Accelerator driver
    pub accel: &'a dyn Accelerator,
    /// WLAN firmware
    pub fw: &'a dyn Firmware,
    /// Ring addressing strategy
    pub addressing: &'a dyn AddressingStrategy,
}

/// Pipe transition flags
///
/// `loading` and `unloading` are never both set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipeLifecycleContext {
    /// Firmware pipes acknowledged as resumed (0..=2)
    pub activated_pipe_count: u8,
    /// Enable transition in flight
    pub loading: bool,
    /// Disable transition in flight
    pub unloading: bool,
    /// Accelerator pipes are disabled
    pub pipes_down: bool,
}

impl Default for PipeLifecycleContext {
    fn default() -> Self {
        Self {
            activated_pipe_count: 0,
            loading: false,
            unloading: false,
            pipes_down: true,
        }
    }
}

/// Coarse pipe state derived from the transition flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipePhase {
    /// Pipes disabled, nothing in flight
    PipesDown,
    /// First-connection transition in flight
    Enabling,
    /// Pipes running
    Enabled,
    /// Last-disconnection transition in flight
    Disabling,
}

/// Connected pipe pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectedPipes {
    /// Accelerator to WLAN
    pub tx: PipeConnection,
    /// WLAN to accelerator
    pub rx: PipeConnection,
}

/// Drives pipe connect, enable and disable against the accelerator
#[derive(Debug)]
pub struct PipeLifecycleManager {
    ctx: PipeLifecycleContext,
    pipes: Option<ConnectedPipes>,
    consumer_pending: bool,
    completion: Arc<Completion>,
}

impl Default for PipeLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeLifecycleManager {
    /// Create a manager with pipes down and unconnected
    pub fn new() -> Self {
        Self {
            ctx: PipeLifecycleContext::default(),
            pipes: None,
            consumer_pending: false,
            completion: Arc::new(Completion::new()),
        }
    }

    // =========================================================================
    // State Queries
    // =========================================================================

    /// Transition flags
    pub fn context(&self) -> PipeLifecycleContext {
        self.ctx
    }

    /// Coarse phase
    pub fn phase(&self) -> PipePhase {
        if self.ctx.loading {
            PipePhase::Enabling
        } else if self.ctx.unloading {
            PipePhase::Disabling
        } else if self.ctx.pipes_down {
            PipePhase::PipesDown
        } else {
            PipePhase::Enabled
        }
    }

    /// Whether either transition is in flight
    pub fn in_transition(&self) -> bool {
        self.ctx.loading || self.ctx.unloading
    }

    /// Whether both firmware pipes have resumed
    pub fn fw_active(&self) -> bool {
        self.ctx.activated_pipe_count == PIPE_COUNT
    }

    /// Whether the accelerator pipes are disabled
    pub fn pipes_down(&self) -> bool {
        self.ctx.pipes_down
    }

    /// Connected pipes, if any
    pub fn connected(&self) -> Option<ConnectedPipes> {
        self.pipes
    }

    /// Signal completed by load and unload transitions
    pub fn completion(&self) -> Arc<Completion> {
        Arc::clone(&self.completion)
    }

    /// Whether a consumer request is waiting for the load to finish
    pub fn consumer_pending(&self) -> bool {
        self.consumer_pending
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect both pipes to the rings the firmware exposes
    pub fn connect(&mut self, hw: PipeHw<'_>, resources: &RingResources) -> Result<ConnectedPipes> {
        if let Some(pipes) = self.pipes {
            log::warn!(target: "wlan_offload", "pipes already connected");
            return Ok(pipes);
        }
        let tx = Self::connect_one(hw, PipeDirection::Tx, resources)?;
        let rx = match Self::connect_one(hw, PipeDirection::Rx, resources) {
            Ok(rx) => rx,
            Err(e) => {
                let _ = hw.accel.disconnect_pipe(tx.handle);
                return Err(e);
            }
        };
        let pipes = ConnectedPipes { tx, rx };
        self.pipes = Some(pipes);
        log::info!(
            target: "wlan_offload",
            "pipes connected: tx={:?} rx={:?}",
            tx.handle,
            rx.handle
        );
        Ok(pipes)
    }

    fn connect_one(
        hw: PipeHw<'_>,
        direction: PipeDirection,
        resources: &RingResources,
    ) -> Result<PipeConnection> {
        let params = hw.addressing.pipe_params(direction, resources);
        let conn = hw.accel.connect_pipe(&params).inspect_err(|e| {
            log::error!(target: "wlan_offload", "{direction:?} pipe connect failed: {e}");
        })?;
        if conn.handle.is_null() {
            log::error!(target: "wlan_offload", "{direction:?} pipe connect returned a null handle");
            return Err(HwError::NullHandle.into());
        }
        Ok(conn)
    }

    /// Disconnect both pipes if connected
    pub fn disconnect(&mut self, hw: PipeHw<'_>) -> Result<()> {
        let Some(pipes) = self.pipes.take() else {
            return Ok(());
        };
        let tx = hw.accel.disconnect_pipe(pipes.tx.handle);
        let rx = hw.accel.disconnect_pipe(pipes.rx.handle);
        log::info!(target: "wlan_offload", "pipes disconnected");
        tx.and(rx).map_err(Error::from)
    }

    // =========================================================================
    // Enable / Disable
    // =========================================================================

    /// Enable and resume both pipes and mark the firmware pipes active
    pub fn enable_pipes(&mut self, hw: PipeHw<'_>) -> Result<()> {
        if !self.ctx.pipes_down {
            log::warn!(target: "wlan_offload", "enable requested while pipes are up");
            return Err(StateError::PipesAlreadyUp.into());
        }
        let pipes = self.pipes.ok_or(StateError::NotLoaded)?;

        hw.addressing.before_enable(hw.fw)?;
        let enabled = [pipes.tx, pipes.rx].iter().try_for_each(|conn| {
            hw.accel.enable_pipe(conn.handle)?;
            hw.accel.resume_pipe(conn.handle)
        });
        if let Err(e) = enabled {
            log::error!(target: "wlan_offload", "pipe enable failed: {e}");
            let _ = hw.addressing.after_disable(hw.fw);
            return Err(e.into());
        }

        hw.fw.set_pipe_active(PipeDirection::Tx, true);
        hw.fw.set_pipe_active(PipeDirection::Rx, true);
        self.completion.reset();
        self.ctx.pipes_down = false;
        log::debug!(target: "wlan_offload", "pipes enabled");
        Ok(())
    }

    /// Suspend and disable both pipes
    pub fn disable_pipes(&mut self, hw: PipeHw<'_>) -> Result<()> {
        if self.ctx.pipes_down {
            log::warn!(target: "wlan_offload", "disable requested while pipes are down");
            return Err(StateError::PipesAlreadyDown.into());
        }
        let pipes = self.pipes.ok_or(StateError::NotLoaded)?;

        let disabled = [pipes.tx, pipes.rx].iter().try_for_each(|conn| {
            hw.accel.suspend_pipe(conn.handle)?;
            hw.accel.disable_pipe(conn.handle)
        });
        if let Err(e) = disabled {
            log::error!(target: "wlan_offload", "pipe disable failed: {e}");
            return Err(e.into());
        }
        let _ = hw.addressing.after_disable(hw.fw);
        self.ctx.pipes_down = true;
        log::debug!(target: "wlan_offload", "pipes disabled");
        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Start the first-connection transition.
    ///
    /// With a synchronous grant the pipes are enabled before returning.
    /// Otherwise the transition stays in `Enabling` until
    /// [`on_resource_granted`](Self::on_resource_granted).
    pub fn first_connection(
        &mut self,
        hw: PipeHw<'_>,
        rm: &ResourceStateMachine,
        host: &dyn HostStack,
    ) -> Result<()> {
        log::info!(target: "wlan_offload", "first connection, bringing pipes up");
        self.ctx.activated_pipe_count = 0;
        self.ctx.loading = true;
        self.completion.reset();

        match rm.request(hw.accel, host) {
            Ok(GrantOutcome::Granted) => {
                let enabled = self.enable_pipes(hw);
                self.ctx.loading = false;
                enabled.map_err(|_| StateError::Busy.into())
            }
            Ok(GrantOutcome::InProgress) => {
                log::debug!(target: "wlan_offload", "waiting for resource grant");
                Ok(())
            }
            Err(e) => {
                self.ctx.loading = false;
                Err(e.into())
            }
        }
    }

    /// Continue an `Enabling` transition once the deferred grant lands.
    ///
    /// Returns `true` if the pipes were enabled.
    pub fn on_resource_granted(&mut self, hw: PipeHw<'_>) -> Result<bool> {
        if self.ctx.unloading || self.ctx.activated_pipe_count != 0 || !self.ctx.pipes_down {
            self.ctx.loading = false;
            return Ok(false);
        }
        let enabled = self.enable_pipes(hw);
        self.ctx.loading = false;
        enabled.map(|()| true)
    }

    /// Finish an unload from the deferred release notification.
    ///
    /// Only applies once both firmware pipes have suspended. Returns `true`
    /// if this cleared `unloading`.
    pub fn on_resource_released(&mut self) -> bool {
        if !self.ctx.unloading || self.ctx.activated_pipe_count != 0 {
            return false;
        }
        self.ctx.unloading = false;
        self.completion.complete();
        true
    }

    /// Start the last-disconnection transition by deactivating the firmware
    /// RX pipe; suspend acknowledgements finish it.
    pub fn last_disconnection(&mut self, hw: PipeHw<'_>) {
        log::info!(target: "wlan_offload", "last disconnection, bringing pipes down");
        self.ctx.unloading = true;
        self.completion.reset();
        hw.fw.set_pipe_active(PipeDirection::Rx, false);
    }

    /// Record a firmware resume acknowledgement.
    ///
    /// Returns `true` when this completed the load transition.
    pub fn on_resumed(&mut self, direction: PipeDirection) -> bool {
        if self.fw_active() {
            log::warn!(target: "wlan_offload", "{direction:?} resume with both pipes already active");
            return false;
        }
        self.ctx.activated_pipe_count += 1;
        if !self.fw_active() {
            return false;
        }
        self.ctx.loading = false;
        self.completion.complete();
        log::info!(target: "wlan_offload", "load complete");
        true
    }

    /// Record a firmware suspend acknowledgement.
    ///
    /// An RX suspend also disables the accelerator pipes and deactivates
    /// the firmware TX pipe. Returns `true` when this completed the unload
    /// transition.
    pub fn on_suspended(&mut self, hw: PipeHw<'_>, direction: PipeDirection) -> bool {
        if direction == PipeDirection::Rx {
            if let Err(e) = self.disable_pipes(hw) {
                log::debug!(target: "wlan_offload", "rx suspend: {e}");
            }
            hw.fw.set_pipe_active(PipeDirection::Tx, false);
        }
        if self.ctx.activated_pipe_count == 0 {
            log::warn!(target: "wlan_offload", "{direction:?} suspend with no active pipe");
            return false;
        }
        self.ctx.activated_pipe_count -= 1;
        if self.ctx.activated_pipe_count != 0 {
            return false;
        }
        self.ctx.unloading = false;
        self.completion.complete();
        log::info!(target: "wlan_offload", "unload complete");
        true
    }

    /// Disable pipes regardless of transition state.
    ///
    /// With the pipes already down no accelerator call is made, but a load
    /// still waiting on its grant is cancelled.
    pub fn force_shutdown(&mut self, hw: PipeHw<'_>) -> Result<()> {
        let disabled = if self.ctx.pipes_down {
            log::debug!(target: "wlan_offload", "force shutdown: pipes already down");
            Ok(())
        } else {
            log::info!(target: "wlan_offload", "forcing pipe shutdown");
            self.disable_pipes(hw)
        };
        self.ctx.pipes_down = true;
        self.ctx.activated_pipe_count = 0;
        self.ctx.loading = false;
        self.ctx.unloading = false;
        self.completion.complete();
        disabled
    }

    /// Arbitrate an accelerator request for the WLAN consumer resource.
    ///
    /// While a transition is in flight the request is remembered and
    /// refused; a completed load satisfies it.
    pub fn consumer_request(&mut self) -> core::result::Result<(), StateError> {
        if self.ctx.loading {
            log::warn!(target: "wlan_offload", "consumer request during load");
            self.consumer_pending = true;
            Err(StateError::InProgress)
        } else if self.ctx.unloading {
            log::warn!(target: "wlan_offload", "consumer request during unload");
            self.consumer_pending = true;
            Err(StateError::Unloading)
        } else {
            Ok(())
        }
    }

    /// Take the pending consumer request flag
    pub fn take_consumer_pending(&mut self) -> bool {
        core::mem::take(&mut self.consumer_pending)
    }

    /// Reinitialize flags to `PipesDown`, keeping the connection
    pub fn reset(&mut self) {
        self.ctx = PipeLifecycleContext::default();
        self.consumer_pending = false;
        self.completion.complete();
    }

    /// Forget the connection without calling the accelerator
    pub fn forget_connection(&mut self) {
        self.pipes = None;
    }
}
