//! Offload coordinator.
//!
//! [`OffloadContext`] owns every piece of coordinator state and is the
//! entry point for the WLAN driver (connection events, suspend/resume,
//! init/deinit, subsystem restart). [`IsrHandle`] is the cheap clone handed
//! to the accelerator's callbacks: firmware messages, resource
//! notifications, data-path frames and transmit completions.
//!
//! - [`config`] - Feature flags and the builder-style configuration
//! - [`error`] - Error types and result aliases
//!
//! Work that must not run in callback context (opcode handling, deferred
//! grants, suspend-queue flushes, timers) is posted to the worker, either a
//! spawned thread or [`OffloadContext::run_pending_work`].
//!
//! # Example
//!
//! ```ignore
//! use wlan_offload::driver::{OffloadConfig, OffloadContext};
//! use wlan_offload::hw::{DeviceMode, WlanEvent};
//!
//! let ctx = OffloadContext::new(OffloadConfig::new(), accel, fw, host)?;
//! ctx.spawn_worker()?;
//! ctx.ol_init()?;
//!
//! ctx.wlan_event(0, DeviceMode::Sap, WlanEvent::ApConnect, own_mac, None)?;
//! ctx.wlan_event(0, DeviceMode::Sap, WlanEvent::ClientConnectEx, sta_mac, Some(1))?;
//! ```

pub mod config;
pub mod error;

mod context;
mod datapath;
mod events;
mod lifecycle;
mod metering;
mod opcodes;
mod perf;
mod stats;

pub use config::{AddressingMode, BandwidthConfig, FeatureFlags, OffloadConfig, SubsystemState};
pub use context::{IsrHandle, OffloadContext};
pub use datapath::{RxOutcome, TxOutcome};
pub use error::{
    ConfigError, ConfigResult, DatapathError, DatapathResult, Error, HwError, HwResult,
    MessageError, Result, SessionError, SessionResult, StateError, StateResult,
};
pub use perf::{BandwidthSampler, PerfLevel, next_bandwidth};
pub use stats::{DatapathCounters, MessageCounters, OffloadStats};
