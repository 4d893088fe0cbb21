//! Synchronization and Concurrency Support
//!
//! Two lock classes are used across the coordinator:
//!
//! - **Primitives** (`primitives`): spin-style, interrupt-safe state
//!   - [`CriticalSectionCell`] - guards resource state, the descriptor free
//!     list, the suspend queue, opcode slots and timers
//!
//! - **Completion** (`completion`): sleep-capable, one-shot signal
//!   - [`Completion`] - timed wait for grant, pipe and metering transitions
//!
//! The control state itself sits behind a `parking_lot::Mutex` in the
//! driver context and is only taken from sleep-capable contexts.
//!
//! # Example
//!
//! ```ignore
//! use wlan_offload::sync::{Completion, CriticalSectionCell};
//!
//! static STATE: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
//!
//! fn irq_callback() {
//!     STATE.with(|s| *s += 1);
//! }
//! ```

mod completion;
mod primitives;

pub use completion::Completion;
pub use primitives::CriticalSectionCell;
