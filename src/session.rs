//! Session directory, interface contexts and associated stations.
//!
//! A session (firmware virtual device) becomes offloaded when an interface
//! context is set up for it. Up to [`MAX_IFACE`] contexts exist at once;
//! context `n` is served by consumer client `WLAN(n+2)_CONS` and the shared
//! producer `WLAN1_PROD`.
//!
//! The directory is read on the data path from interrupt-like context, so it
//! sits behind a [`CriticalSectionCell`]. The station table is only touched
//! while processing connection events and lives in the control state.

use crate::constants::{MAX_IFACE, MAX_SESSIONS, MAX_STATIONS, UNMAPPED_IFACE};
use crate::driver::error::{SessionError, SessionResult};
use crate::hw::{ClientId, DeviceMode, InterfaceClients, MacAddr, SessionId};
use crate::sync::CriticalSectionCell;

/// Accelerator clients serving interface `iface_id`
pub const fn clients_for(iface_id: u8) -> InterfaceClients {
    let cons = match iface_id {
        0 => ClientId::Wlan2Cons,
        1 => ClientId::Wlan3Cons,
        _ => ClientId::Wlan4Cons,
    };
    InterfaceClients {
        cons,
        prod: ClientId::Wlan1Prod,
    }
}

/// Per-interface data-path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceCounters {
    /// Frames handed to the firmware
    pub tx: u64,
    /// Frames dropped before reaching the firmware
    pub tx_dropped: u64,
    /// Exception frames received
    pub rx_exception: u64,
    /// Exception frames delivered to the host stack
    pub rx_delivered: u64,
    /// Exception frames dropped
    pub rx_dropped: u64,
}

/// One offloaded interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceContext {
    /// Table index
    pub iface_id: u8,
    /// Owning session
    pub session: SessionId,
    /// Device mode
    pub mode: DeviceMode,
    /// Own address (SAP) or BSSID (STA) from the connect event
    pub mac: MacAddr,
    /// Accelerator clients
    pub clients: InterfaceClients,
    /// Data-path counters
    pub counters: InterfaceCounters,
}

#[derive(Debug)]
struct DirectoryInner {
    ifaces: [Option<InterfaceContext>; MAX_IFACE],
    vdev_to_iface: [u8; MAX_SESSIONS],
    offload: [bool; MAX_SESSIONS],
}

impl Default for DirectoryInner {
    fn default() -> Self {
        Self {
            ifaces: [None; MAX_IFACE],
            vdev_to_iface: [UNMAPPED_IFACE; MAX_SESSIONS],
            offload: [false; MAX_SESSIONS],
        }
    }
}

impl DirectoryInner {
    fn by_session(&self, session: SessionId) -> Option<&InterfaceContext> {
        self.ifaces.iter().flatten().find(|ctx| ctx.session == session)
    }
}

fn check_session(session: SessionId) -> SessionResult<usize> {
    let idx = usize::from(session);
    if idx < MAX_SESSIONS {
        Ok(idx)
    } else {
        Err(SessionError::InvalidSession)
    }
}

/// Session to interface mapping and interface table
#[derive(Debug, Default)]
pub struct SessionDirectory {
    inner: CriticalSectionCell<DirectoryInner>,
}

impl SessionDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an interface context for `session` in the first free slot
    pub fn setup_interface(
        &self,
        session: SessionId,
        mode: DeviceMode,
        mac: MacAddr,
    ) -> SessionResult<InterfaceContext> {
        check_session(session)?;
        self.inner.with(|dir| {
            if dir.by_session(session).is_some() {
                return Err(SessionError::InterfaceExists);
            }
            let (idx, slot) = dir
                .ifaces
                .iter_mut()
                .enumerate()
                .find(|(_, slot)| slot.is_none())
                .ok_or(SessionError::NoFreeInterface)?;
            let iface_id = idx as u8;
            let ctx = InterfaceContext {
                iface_id,
                session,
                mode,
                mac,
                clients: clients_for(iface_id),
                counters: InterfaceCounters::default(),
            };
            *slot = Some(ctx);
            Ok(ctx)
        })
    }

    /// Remove the interface context of `session`, unmapping it
    pub fn cleanup_interface(&self, session: SessionId) -> Option<InterfaceContext> {
        self.inner.with(|dir| {
            let slot = dir
                .ifaces
                .iter_mut()
                .find(|slot| slot.is_some_and(|ctx| ctx.session == session))?;
            let ctx = slot.take()?;
            if let Some(mapped) = dir.vdev_to_iface.get_mut(usize::from(session)) {
                *mapped = UNMAPPED_IFACE;
            }
            Some(ctx)
        })
    }

    /// Interface context owned by `session`, mapped or not
    pub fn interface_of(&self, session: SessionId) -> Option<InterfaceContext> {
        self.inner.with_ref(|dir| dir.by_session(session).copied())
    }

    /// First interface context in `mode`
    pub fn interface_in_mode(&self, mode: DeviceMode) -> Option<InterfaceContext> {
        self.inner
            .with_ref(|dir| dir.ifaces.iter().flatten().find(|ctx| ctx.mode == mode).copied())
    }

    /// Route data-path traffic for `session` to its interface context
    pub fn map(&self, session: SessionId) -> SessionResult<()> {
        let idx = check_session(session)?;
        self.inner.with(|dir| {
            let iface_id = dir
                .by_session(session)
                .map(|ctx| ctx.iface_id)
                .ok_or(SessionError::NoInterface)?;
            dir.vdev_to_iface[idx] = iface_id;
            Ok(())
        })
    }

    /// Stop routing data-path traffic for `session`
    pub fn unmap(&self, session: SessionId) {
        self.inner.with(|dir| {
            if let Some(mapped) = dir.vdev_to_iface.get_mut(usize::from(session)) {
                *mapped = UNMAPPED_IFACE;
            }
        });
    }

    /// Data-path lookup through the session mapping
    pub fn lookup(&self, session: SessionId) -> Option<InterfaceContext> {
        self.inner.with_ref(|dir| {
            let iface_id = *dir.vdev_to_iface.get(usize::from(session))?;
            dir.ifaces.get(usize::from(iface_id))?.as_ref().copied()
        })
    }

    /// Update the counters of interface `iface_id`
    pub fn update_counters(&self, iface_id: u8, f: impl FnOnce(&mut InterfaceCounters)) {
        self.inner.with(|dir| {
            if let Some(Some(ctx)) = dir.ifaces.get_mut(usize::from(iface_id)) {
                f(&mut ctx.counters);
            }
        });
    }

    /// Record the offload state of `session`.
    ///
    /// Returns `OffloadUnchanged` if it already has that state.
    pub fn set_offload(&self, session: SessionId, enable: bool) -> SessionResult<()> {
        let idx = check_session(session)?;
        self.inner.with(|dir| {
            if dir.offload[idx] == enable {
                return Err(SessionError::OffloadUnchanged);
            }
            dir.offload[idx] = enable;
            Ok(())
        })
    }

    /// Whether offload is enabled for `session`
    pub fn offload_enabled(&self, session: SessionId) -> bool {
        self.inner
            .with_ref(|dir| dir.offload.get(usize::from(session)).copied().unwrap_or(false))
    }

    /// Number of interface contexts
    pub fn interface_count(&self) -> usize {
        self.inner.with_ref(|dir| dir.ifaces.iter().flatten().count())
    }

    /// Snapshot of every interface context
    pub fn interfaces(&self) -> Vec<InterfaceContext> {
        self.inner.with_ref(|dir| dir.ifaces.iter().flatten().copied().collect())
    }

    /// Clear mappings and offload flags, keeping interface contexts
    pub fn reset_mappings(&self) {
        self.inner.with(|dir| {
            dir.vdev_to_iface = [UNMAPPED_IFACE; MAX_SESSIONS];
            dir.offload = [false; MAX_SESSIONS];
        });
    }
}

// =============================================================================
// Station Table
// =============================================================================

/// Stations associated to the SAP, keyed by firmware station id
#[derive(Debug, Default)]
pub struct StationTable {
    stations: Vec<u8>,
}

impl StationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly associated station
    pub fn add(&mut self, station_id: u8) -> SessionResult<()> {
        if self.stations.contains(&station_id) {
            return Err(SessionError::DuplicateStation);
        }
        if self.stations.len() >= MAX_STATIONS {
            return Err(SessionError::StationTableFull);
        }
        self.stations.push(station_id);
        Ok(())
    }

    /// Forget a station
    pub fn remove(&mut self, station_id: u8) -> SessionResult<()> {
        let pos = self
            .stations
            .iter()
            .position(|&id| id == station_id)
            .ok_or(SessionError::UnknownStation)?;
        self.stations.swap_remove(pos);
        Ok(())
    }

    /// Whether `station_id` is associated
    pub fn contains(&self, station_id: u8) -> bool {
        self.stations.contains(&station_id)
    }

    /// Associated station count
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether no station is associated
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Forget every station
    pub fn clear(&mut self) {
        self.stations.clear();
    }
}
