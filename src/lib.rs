//! WLAN Offload Coordinator
//!
//! Host-side coordination for a WLAN data path offloaded to a packet
//! accelerator with a micro-controller (uC) in the WLAN firmware.
//!
//! The coordinator decides when the accelerator pipes come up and go down,
//! holds the accelerator's producer resource while traffic may flow, and
//! keeps the WLAN driver, the firmware and the accelerator agreeing on
//! which interfaces and stations are offloaded.
//!
//! # Architecture
//!
//! The crate is organized in three layers:
//!
//! 1. **Coordinator** ([`driver`]): [`OffloadContext`] and the callback-side
//!    [`IsrHandle`], connection events, data path, subsystem lifecycle
//! 2. **State machines**: [`rm`] (producer resource), [`pipe`] (pipe
//!    transitions), [`dispatcher`] (firmware opcodes), [`pending`]
//!    (events deferred behind a transition), [`dma`] (descriptor pool and
//!    suspend queue), [`session`] (interfaces and stations)
//! 3. **Collaborators** ([`hw`]): the [`Accelerator`], [`Firmware`] and
//!    [`HostStack`] traits the host implements
//!
//! ## Locking
//!
//! - Spin-style state shared with callbacks sits in
//!   [`CriticalSectionCell`](sync::CriticalSectionCell)
//! - Control state (pipes, pending events, stations) sits behind a
//!   sleep-capable `parking_lot::Mutex`, always taken before any
//!   critical section
//! - No collaborator is called from inside a critical section
//!
//! # Features
//!
//! - `defmt`: Enable defmt formatting for error and state types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wlan_offload::{OffloadConfig, OffloadContext, FeatureFlags};
//!
//! let config = OffloadConfig::new()
//!     .with_features(FeatureFlags::ENABLE | FeatureFlags::UC | FeatureFlags::RM)
//!     .with_tx_desc_pool_size(512);
//!
//! let ctx = OffloadContext::new(config, Arc::new(accel), Arc::new(fw), Arc::new(host))?;
//! ctx.spawn_worker()?;
//! ctx.ol_init()?;
//!
//! // Hand this to the accelerator callbacks
//! let isr = ctx.isr_handle();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here; thresholds are in Cargo.toml.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements
)]

// =============================================================================
// Modules
// =============================================================================

pub mod classify;
pub mod constants;
pub mod dispatcher;
pub mod dma;
pub mod driver;
pub mod hw;
pub mod pending;
pub mod pipe;
pub mod rm;
pub mod session;
pub mod sync;
pub mod worker;

// Test utilities (only available during testing)
#[cfg(test)]
#[allow(missing_docs)]
pub(crate) mod test_utils;

// =============================================================================
// Re-exports
// =============================================================================

pub use driver::{
    AddressingMode, BandwidthConfig, ConfigError, ConfigResult, DatapathError, Error,
    FeatureFlags, HwError, IsrHandle, OffloadConfig, OffloadContext, OffloadStats, Result,
    RxOutcome, SessionError, StateError, SubsystemState, TxOutcome,
};
pub use hw::{Accelerator, AcceleratorMessage, DeviceMode, Firmware, HostStack, WlanEvent};
pub use pipe::PipePhase;
pub use rm::ResourceState;
