//! Transmit descriptor pool and power-management queue.
//!
//! # Architecture
//!
//! - [`TxDescriptorPool`]: fixed array of descriptor slots and a FIFO free
//!   list. Each in-use slot holds the accelerator's [`BufferToken`] for one
//!   in-flight transfer; the in-flight counter gates resource release.
//! - [`SuspendResumeQueue`]: frames parked while the host is suspended,
//!   drained on resume.
//!
//! Both sit behind [`CriticalSectionCell`](crate::sync::CriticalSectionCell)
//! so the accelerator's completion callback can return slots without
//! taking a sleep-capable lock.
//!
//! # Example
//!
//! ```ignore
//! use wlan_offload::dma::TxDescriptorPool;
//! use wlan_offload::hw::BufferToken;
//!
//! let pool = TxDescriptorPool::new();
//! pool.allocate(4);
//! let slot = pool.acquire(BufferToken(7)).unwrap();
//! assert_eq!(pool.release(slot), Some(BufferToken(7)));
//! ```
//!
//! [`BufferToken`]: crate::hw::BufferToken

mod pm_queue;
mod tx_pool;

pub use pm_queue::{PmEntry, PmStats, SuspendResumeQueue};
pub use tx_pool::{PoolCounts, PoolStats, TxDescriptorPool};

/// Descriptor slot index
pub type SlotId = u16;
