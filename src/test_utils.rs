//! Testing utilities and mock implementations
//!
//! Mock collaborators for driving the coordinator on the host without an
//! accelerator or WLAN target. Every mock records its calls so tests can
//! verify exactly what reached the hardware boundary.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]

use parking_lot::Mutex;
use smoltcp::wire::{
    ETHERNET_HEADER_LEN, EthernetAddress, EthernetFrame, EthernetProtocol, IPV4_HEADER_LEN,
    IpProtocol, Ipv4Address, Ipv4Packet, UDP_HEADER_LEN, UdpPacket,
};

use crate::constants::{DHCP_CLIENT_PORT, DHCP_SERVER_PORT, ETHERTYPE_EAPOL};
use crate::dma::SlotId;
use crate::driver::error::{HwError, HwResult};
use crate::hw::{
    Accelerator, AcceleratorMessage, BufferToken, DeviceMode, Firmware, Frame, GrantStatus,
    HostStack, InterfaceClients, MacAddr, PipeConnectParams, PipeConnection, PipeDirection,
    PipeHandle, ResourceName, RingRegion, RingResources, SessionId,
};

// =============================================================================
// Mock Accelerator
// =============================================================================

/// Calls recorded by [`MockAccelerator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccelCall {
    RequestResource(ResourceName),
    ReleaseResource(ResourceName),
    ResourceHeld,
    NotifyConsumerGranted(ResourceName),
    SetPerfProfile(ResourceName, u32),
    ConnectPipe(PipeDirection),
    DisconnectPipe(PipeHandle),
    EnablePipe(PipeHandle),
    ResumePipe(PipeHandle),
    SuspendPipe(PipeHandle),
    DisablePipe(PipeHandle),
    RegisterInterface(u8, InterfaceClients),
    DeregisterInterface(u8),
    SendMessage(AcceleratorMessage),
    ReleaseBuffer(BufferToken),
}

#[derive(Debug, Default)]
struct AccelKnobs {
    async_grant: bool,
    fail_request: Option<i32>,
    fail_release: bool,
    resource_held: Option<bool>,
    fail_enable: bool,
    fail_disable: bool,
    fail_connect: bool,
    null_handle: bool,
}

/// Mock accelerator driver
///
/// Grants synchronously and succeeds at everything unless a knob says
/// otherwise. TX pipes get handle 1, RX pipes handle 2.
#[derive(Debug, Default)]
pub struct MockAccelerator {
    knobs: Mutex<AccelKnobs>,
    log: Mutex<Vec<AccelCall>>,
}

impl MockAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer resource requests with "pending" instead of granting
    pub fn set_async_grant(&self, enabled: bool) {
        self.knobs.lock().async_grant = enabled;
    }

    pub fn set_fail_request(&self, code: Option<i32>) {
        self.knobs.lock().fail_request = code;
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.knobs.lock().fail_release = fail;
    }

    pub fn set_resource_held(&self, held: Option<bool>) {
        self.knobs.lock().resource_held = held;
    }

    pub fn set_fail_enable(&self, fail: bool) {
        self.knobs.lock().fail_enable = fail;
    }

    pub fn set_fail_disable(&self, fail: bool) {
        self.knobs.lock().fail_disable = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.knobs.lock().fail_connect = fail;
    }

    /// Return the null handle from `connect_pipe`
    pub fn set_null_handle(&self, null: bool) {
        self.knobs.lock().null_handle = null;
    }

    pub fn calls(&self) -> Vec<AccelCall> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&AccelCall) -> bool) -> usize {
        self.log.lock().iter().filter(|call| pred(call)).count()
    }

    pub fn request_count(&self) -> usize {
        self.count(|c| matches!(c, AccelCall::RequestResource(_)))
    }

    pub fn release_count(&self) -> usize {
        self.count(|c| matches!(c, AccelCall::ReleaseResource(_)))
    }

    pub fn enable_count(&self) -> usize {
        self.count(|c| matches!(c, AccelCall::EnablePipe(_)))
    }

    pub fn disable_count(&self) -> usize {
        self.count(|c| matches!(c, AccelCall::DisablePipe(_)))
    }

    pub fn messages(&self) -> Vec<AcceleratorMessage> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                AccelCall::SendMessage(msg) => Some(*msg),
                _ => None,
            })
            .collect()
    }

    pub fn released_buffers(&self) -> Vec<BufferToken> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                AccelCall::ReleaseBuffer(token) => Some(*token),
                _ => None,
            })
            .collect()
    }

    pub fn perf_profiles(&self) -> Vec<(ResourceName, u32)> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                AccelCall::SetPerfProfile(res, mbps) => Some((*res, *mbps)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: AccelCall) {
        self.log.lock().push(call);
    }
}

impl Accelerator for MockAccelerator {
    fn request_resource(&self, resource: ResourceName) -> HwResult<GrantStatus> {
        self.record(AccelCall::RequestResource(resource));
        let knobs = self.knobs.lock();
        if let Some(code) = knobs.fail_request {
            return Err(HwError::Rejected(code));
        }
        Ok(if knobs.async_grant {
            GrantStatus::Pending
        } else {
            GrantStatus::Granted
        })
    }

    fn release_resource(&self, resource: ResourceName) -> HwResult<()> {
        self.record(AccelCall::ReleaseResource(resource));
        if self.knobs.lock().fail_release {
            return Err(HwError::Rejected(-16));
        }
        Ok(())
    }

    fn resource_held(&self, _resource: ResourceName) -> Option<bool> {
        self.record(AccelCall::ResourceHeld);
        self.knobs.lock().resource_held
    }

    fn notify_consumer_granted(&self, resource: ResourceName) {
        self.record(AccelCall::NotifyConsumerGranted(resource));
    }

    fn set_perf_profile(&self, resource: ResourceName, bandwidth_mbps: u32) -> HwResult<()> {
        self.record(AccelCall::SetPerfProfile(resource, bandwidth_mbps));
        Ok(())
    }

    fn connect_pipe(&self, params: &PipeConnectParams) -> HwResult<PipeConnection> {
        self.record(AccelCall::ConnectPipe(params.direction));
        let knobs = self.knobs.lock();
        if knobs.fail_connect {
            return Err(HwError::Unavailable);
        }
        let handle = match (knobs.null_handle, params.direction) {
            (true, _) => PipeHandle(0),
            (false, PipeDirection::Tx) => PipeHandle(1),
            (false, PipeDirection::Rx) => PipeHandle(2),
        };
        Ok(PipeConnection {
            handle,
            doorbell: 0xF000_0000 + u64::from(handle.0) * 0x10,
        })
    }

    fn disconnect_pipe(&self, handle: PipeHandle) -> HwResult<()> {
        self.record(AccelCall::DisconnectPipe(handle));
        Ok(())
    }

    fn enable_pipe(&self, handle: PipeHandle) -> HwResult<()> {
        self.record(AccelCall::EnablePipe(handle));
        if self.knobs.lock().fail_enable {
            return Err(HwError::Rejected(-1));
        }
        Ok(())
    }

    fn resume_pipe(&self, handle: PipeHandle) -> HwResult<()> {
        self.record(AccelCall::ResumePipe(handle));
        Ok(())
    }

    fn suspend_pipe(&self, handle: PipeHandle) -> HwResult<()> {
        self.record(AccelCall::SuspendPipe(handle));
        Ok(())
    }

    fn disable_pipe(&self, handle: PipeHandle) -> HwResult<()> {
        self.record(AccelCall::DisablePipe(handle));
        if self.knobs.lock().fail_disable {
            return Err(HwError::Rejected(-1));
        }
        Ok(())
    }

    fn register_interface(&self, iface_id: u8, clients: InterfaceClients) -> HwResult<()> {
        self.record(AccelCall::RegisterInterface(iface_id, clients));
        Ok(())
    }

    fn deregister_interface(&self, iface_id: u8) -> HwResult<()> {
        self.record(AccelCall::DeregisterInterface(iface_id));
        Ok(())
    }

    fn send_message(&self, message: &AcceleratorMessage) -> HwResult<()> {
        self.record(AccelCall::SendMessage(*message));
        Ok(())
    }

    fn release_buffer(&self, token: BufferToken) {
        self.record(AccelCall::ReleaseBuffer(token));
    }
}

// =============================================================================
// Mock Firmware
// =============================================================================

/// Calls recorded by [`MockFirmware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FwCall {
    SetPipeActive(PipeDirection, bool),
    MapRxHash(bool),
    RequestStats,
    SetOffload(SessionId, DeviceMode, bool),
    SendTx(SessionId, SlotId, Frame),
    RequestSharingStats(bool),
    SetQuota(bool, u32, u32),
}

#[derive(Debug)]
struct FwKnobs {
    resources: RingResources,
    capacity: usize,
    fail_send: bool,
    forward_ok: bool,
    peer_authorized: Option<bool>,
}

/// Mock WLAN target
#[derive(Debug)]
pub struct MockFirmware {
    knobs: Mutex<FwKnobs>,
    log: Mutex<Vec<FwCall>>,
}

impl Default for MockFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFirmware {
    pub fn new() -> Self {
        Self {
            knobs: Mutex::new(FwKnobs {
                resources: Self::default_resources(),
                capacity: 1024,
                fail_send: false,
                forward_ok: true,
                peer_authorized: Some(true),
            }),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Plausible ring layout
    pub fn default_resources() -> RingResources {
        RingResources {
            tx_comp_ring: RingRegion { base: 0x8000_0000, size: 0x2000 },
            tx_buffers: RingRegion { base: 0x8001_0000, size: 0x4000 },
            tx_buffer_count: 1024,
            rx_ready_ring: RingRegion { base: 0x8002_0000, size: 0x2000 },
            rx_proc_done_idx: RingRegion { base: 0x8003_0000, size: 4 },
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.knobs.lock().capacity = capacity;
    }

    pub fn set_resources(&self, resources: RingResources) {
        self.knobs.lock().resources = resources;
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.knobs.lock().fail_send = fail;
    }

    pub fn set_forward_ok(&self, ok: bool) {
        self.knobs.lock().forward_ok = ok;
    }

    pub fn set_peer_authorized(&self, authorized: Option<bool>) {
        self.knobs.lock().peer_authorized = authorized;
    }

    pub fn calls(&self) -> Vec<FwCall> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().clear();
    }

    pub fn rx_hash_maps(&self) -> Vec<bool> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                FwCall::MapRxHash(map) => Some(*map),
                _ => None,
            })
            .collect()
    }

    pub fn pipe_activity(&self) -> Vec<(PipeDirection, bool)> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                FwCall::SetPipeActive(dir, active) => Some((*dir, *active)),
                _ => None,
            })
            .collect()
    }

    pub fn offload_calls(&self) -> Vec<(SessionId, bool)> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                FwCall::SetOffload(session, _, enable) => Some((*session, *enable)),
                _ => None,
            })
            .collect()
    }

    pub fn sent_frames(&self) -> Vec<(SessionId, SlotId, Frame)> {
        self.log
            .lock()
            .iter()
            .filter_map(|c| match c {
                FwCall::SendTx(session, slot, frame) => Some((*session, *slot, frame.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn stats_requests(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|c| matches!(c, FwCall::RequestStats))
            .count()
    }

    fn record(&self, call: FwCall) {
        self.log.lock().push(call);
    }
}

impl Firmware for MockFirmware {
    fn ring_resources(&self) -> HwResult<RingResources> {
        Ok(self.knobs.lock().resources)
    }

    fn tx_pool_capacity(&self) -> usize {
        self.knobs.lock().capacity
    }

    fn set_pipe_active(&self, direction: PipeDirection, active: bool) {
        self.record(FwCall::SetPipeActive(direction, active));
    }

    fn map_rx_hash(&self, map: bool) -> HwResult<()> {
        self.record(FwCall::MapRxHash(map));
        Ok(())
    }

    fn request_stats(&self) -> HwResult<()> {
        self.record(FwCall::RequestStats);
        Ok(())
    }

    fn set_offload(&self, session: SessionId, mode: DeviceMode, enable: bool) -> HwResult<()> {
        self.record(FwCall::SetOffload(session, mode, enable));
        Ok(())
    }

    fn send_tx(&self, session: SessionId, slot: SlotId, frame: Frame) -> Result<(), Frame> {
        if self.knobs.lock().fail_send {
            return Err(frame);
        }
        self.record(FwCall::SendTx(session, slot, frame));
        Ok(())
    }

    fn forward_threshold_ok(&self, _session: SessionId) -> bool {
        self.knobs.lock().forward_ok
    }

    fn peer_authorized(&self, _session: SessionId, _peer: MacAddr) -> Option<bool> {
        self.knobs.lock().peer_authorized
    }

    fn request_sharing_stats(&self, reset: bool) -> HwResult<()> {
        self.record(FwCall::RequestSharingStats(reset));
        Ok(())
    }

    fn set_quota(&self, enable: bool, quota_lo: u32, quota_hi: u32) -> HwResult<()> {
        self.record(FwCall::SetQuota(enable, quota_lo, quota_hi));
        Ok(())
    }
}

// =============================================================================
// Mock Host Stack
// =============================================================================

#[derive(Debug)]
struct HostKnobs {
    interface_live: bool,
    tx_blocked: bool,
    intra_bss: bool,
    refuse_delivery: bool,
    fail_transmit: bool,
}

impl Default for HostKnobs {
    fn default() -> Self {
        Self {
            interface_live: true,
            tx_blocked: false,
            intra_bss: true,
            refuse_delivery: false,
            fail_transmit: false,
        }
    }
}

/// Mock host network stack
#[derive(Debug, Default)]
pub struct MockHostStack {
    knobs: Mutex<HostKnobs>,
    delivered: Mutex<Vec<(SessionId, Frame)>>,
    transmitted: Mutex<Vec<(SessionId, Frame)>>,
    dhcp: Mutex<Vec<(SessionId, MacAddr)>>,
    wake_lock: Mutex<Vec<bool>>,
}

impl MockHostStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interface_live(&self, live: bool) {
        self.knobs.lock().interface_live = live;
    }

    pub fn set_tx_blocked(&self, blocked: bool) {
        self.knobs.lock().tx_blocked = blocked;
    }

    pub fn set_intra_bss(&self, allowed: bool) {
        self.knobs.lock().intra_bss = allowed;
    }

    pub fn set_refuse_delivery(&self, refuse: bool) {
        self.knobs.lock().refuse_delivery = refuse;
    }

    pub fn set_fail_transmit(&self, fail: bool) {
        self.knobs.lock().fail_transmit = fail;
    }

    pub fn delivered(&self) -> Vec<(SessionId, Frame)> {
        self.delivered.lock().clone()
    }

    pub fn transmitted(&self) -> Vec<(SessionId, Frame)> {
        self.transmitted.lock().clone()
    }

    pub fn dhcp_indications(&self) -> Vec<(SessionId, MacAddr)> {
        self.dhcp.lock().clone()
    }

    pub fn wake_lock_calls(&self) -> Vec<bool> {
        self.wake_lock.lock().clone()
    }
}

impl HostStack for MockHostStack {
    fn deliver(&self, session: SessionId, frame: Frame) -> bool {
        if self.knobs.lock().refuse_delivery {
            return false;
        }
        self.delivered.lock().push((session, frame));
        true
    }

    fn transmit(&self, session: SessionId, frame: Frame) -> Result<(), Frame> {
        if self.knobs.lock().fail_transmit {
            return Err(frame);
        }
        self.transmitted.lock().push((session, frame));
        Ok(())
    }

    fn intra_bss_forwarding(&self, _session: SessionId) -> bool {
        self.knobs.lock().intra_bss
    }

    fn tx_blocked(&self, _session: SessionId) -> bool {
        self.knobs.lock().tx_blocked
    }

    fn dhcp_indication(&self, session: SessionId, station: MacAddr) {
        self.dhcp.lock().push((session, station));
    }

    fn wake_lock(&self, hold: bool) {
        self.wake_lock.lock().push(hold);
    }

    fn interface_live(&self, _session: SessionId) -> bool {
        self.knobs.lock().interface_live
    }
}

// =============================================================================
// Frame Builders
// =============================================================================

pub const SAP_MAC: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const STA_MAC: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
pub const CLIENT_MAC: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x10];
pub const PEER_MAC: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x20];

/// Client MAC for station `n`
pub fn client_mac(n: u8) -> MacAddr {
    [0x02, 0x00, 0x00, 0x00, 0x01, n]
}

/// Ethernet II frame
pub fn ethernet_frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Frame {
    let mut buf = vec![0u8; ETHERNET_HEADER_LEN + payload.len()];
    let mut frame = EthernetFrame::new_unchecked(&mut buf[..]);
    frame.set_dst_addr(EthernetAddress(dst));
    frame.set_src_addr(EthernetAddress(src));
    frame.set_ethertype(EthernetProtocol::from(ethertype));
    frame.payload_mut().copy_from_slice(payload);
    buf
}

/// EAPOL-Key frame
pub fn eapol_frame(dst: MacAddr, src: MacAddr) -> Frame {
    ethernet_frame(dst, src, ETHERTYPE_EAPOL, &[0x02, 0x03, 0x00, 0x5f, 0x02])
}

/// IPv4/UDP frame between the given ports
pub fn udp_frame(dst: MacAddr, src: MacAddr, src_port: u16, dst_port: u16) -> Frame {
    let udp_len = UDP_HEADER_LEN + 4;
    let ip_len = IPV4_HEADER_LEN + udp_len;
    let mut ip = vec![0u8; ip_len];
    {
        let mut packet = Ipv4Packet::new_unchecked(&mut ip[..]);
        packet.set_version(4);
        packet.set_header_len(IPV4_HEADER_LEN as u8);
        packet.set_total_len(ip_len as u16);
        packet.set_hop_limit(64);
        packet.set_next_header(IpProtocol::Udp);
        packet.set_src_addr(Ipv4Address::new(0, 0, 0, 0));
        packet.set_dst_addr(Ipv4Address::new(255, 255, 255, 255));
        packet.fill_checksum();
        let mut udp = UdpPacket::new_unchecked(packet.payload_mut());
        udp.set_src_port(src_port);
        udp.set_dst_port(dst_port);
        udp.set_len(udp_len as u16);
        udp.set_checksum(0);
    }
    ethernet_frame(dst, src, u16::from(EthernetProtocol::Ipv4), &ip)
}

/// DHCP DISCOVER-style frame from a client
pub fn dhcp_frame(dst: MacAddr, src: MacAddr) -> Frame {
    udp_frame(dst, src, DHCP_CLIENT_PORT, DHCP_SERVER_PORT)
}

/// Plain data frame that is neither EAPOL nor DHCP
pub fn data_frame(dst: MacAddr, src: MacAddr) -> Frame {
    udp_frame(dst, src, 40000, 5001)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::ClientId;

    #[test]
    fn mock_accelerator_records_calls() {
        let accel = MockAccelerator::new();
        accel.request_resource(ResourceName::WlanProd).unwrap();
        accel.send_message(&AcceleratorMessage::WdiEnable).unwrap();
        assert_eq!(accel.request_count(), 1);
        assert_eq!(accel.messages(), vec![AcceleratorMessage::WdiEnable]);
        accel.clear_calls();
        assert!(accel.calls().is_empty());
    }

    #[test]
    fn mock_accelerator_handles_by_direction() {
        let accel = MockAccelerator::new();
        let params = PipeConnectParams {
            client: ClientId::Wlan1Cons,
            direction: PipeDirection::Tx,
            ring: crate::hw::RingAddress::Physical(0),
            ring_size: 0,
            companion: crate::hw::RingAddress::Physical(0),
            companion_size: 0,
        };
        assert_eq!(accel.connect_pipe(&params).unwrap().handle, PipeHandle(1));
        accel.set_null_handle(true);
        assert!(accel.connect_pipe(&params).unwrap().handle.is_null());
    }

    #[test]
    fn mock_firmware_send_failure_returns_frame() {
        let fw = MockFirmware::new();
        fw.set_fail_send(true);
        let frame = vec![1, 2, 3];
        assert_eq!(fw.send_tx(0, 0, frame.clone()), Err(frame));
        assert!(fw.sent_frames().is_empty());
    }

    #[test]
    fn frame_builders_parse_back() {
        let frame = dhcp_frame(SAP_MAC, CLIENT_MAC);
        let eth = EthernetFrame::new_checked(&frame[..]).unwrap();
        assert_eq!(eth.ethertype(), EthernetProtocol::Ipv4);
        let ip = Ipv4Packet::new_checked(eth.payload()).unwrap();
        let udp = UdpPacket::new_checked(ip.payload()).unwrap();
        assert_eq!(udp.dst_port(), DHCP_SERVER_PORT);
    }
}
