//! Exception frame classification.
//!
//! Frames the accelerator could not handle come back to the host. Before
//! delivery the data path needs the Ethernet addresses, whether the frame
//! is a key-exchange frame (EAPOL or WAPI), and whether it is DHCP.

use smoltcp::wire::{EthernetFrame, EthernetProtocol, IpProtocol, Ipv4Packet, UdpPacket};

use crate::constants::{
    DHCP_CLIENT_PORT, DHCP_SERVER_PORT, ETHERTYPE_EAPOL, ETHERTYPE_WAPI, FW_RX_DESC_DISCARD,
    FW_RX_DESC_FORWARD,
};
use crate::driver::error::{DatapathError, DatapathResult};
use crate::hw::MacAddr;

/// Header fields of an exception frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Destination address
    pub dst: MacAddr,
    /// Source address
    pub src: MacAddr,
    /// EtherType
    pub ethertype: u16,
    /// IPv4/UDP frame between the DHCP ports
    pub dhcp: bool,
}

impl FrameInfo {
    /// EAPOL key exchange
    pub const fn is_eapol(&self) -> bool {
        self.ethertype == ETHERTYPE_EAPOL
    }

    /// EAPOL or WAPI key exchange
    pub const fn is_key_exchange(&self) -> bool {
        self.ethertype == ETHERTYPE_EAPOL || self.ethertype == ETHERTYPE_WAPI
    }

    /// Group-addressed destination
    pub const fn is_multicast(&self) -> bool {
        self.dst[0] & 0x01 != 0
    }
}

/// Parse the headers of an Ethernet frame
pub fn classify(frame: &[u8]) -> DatapathResult<FrameInfo> {
    let eth = EthernetFrame::new_checked(frame).map_err(|_| DatapathError::MalformedFrame)?;
    let ethertype = u16::from(eth.ethertype());
    let dhcp = eth.ethertype() == EthernetProtocol::Ipv4 && is_dhcp(eth.payload());
    Ok(FrameInfo {
        dst: eth.dst_addr().0,
        src: eth.src_addr().0,
        ethertype,
        dhcp,
    })
}

fn is_dhcp(ip_payload: &[u8]) -> bool {
    let Ok(ip) = Ipv4Packet::new_checked(ip_payload) else {
        return false;
    };
    if ip.next_header() != IpProtocol::Udp {
        return false;
    }
    let Ok(udp) = UdpPacket::new_checked(ip.payload()) else {
        return false;
    };
    matches!(
        (udp.src_port(), udp.dst_port()),
        (DHCP_CLIENT_PORT, DHCP_SERVER_PORT) | (DHCP_SERVER_PORT, DHCP_CLIENT_PORT)
    )
}

/// Intra-BSS decision carried in the firmware receive descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ForwardAction {
    /// Deliver to the host only
    Deliver,
    /// Forward back out and also deliver a copy
    ForwardAndDeliver,
    /// Forward back out without delivering
    ForwardOnly,
}

impl ForwardAction {
    /// Decode the firmware descriptor bits
    pub const fn from_fw_desc(fw_desc: u8) -> Self {
        if fw_desc & FW_RX_DESC_FORWARD == 0 {
            ForwardAction::Deliver
        } else if fw_desc & FW_RX_DESC_DISCARD != 0 {
            ForwardAction::ForwardOnly
        } else {
            ForwardAction::ForwardAndDeliver
        }
    }
}
