//! Firmware operation message decoding.
//!
//! Every message starts with an 8-byte little-endian header:
//!
//! | offset | size | field    |
//! |--------|------|----------|
//! | 0      | 1    | msg_type |
//! | 1      | 1    | reserved |
//! | 2      | 2    | opcode   |
//! | 4      | 2    | len      |
//! | 6      | 2    | reserved |
//!
//! followed by `len` bytes of opcode-specific payload.

use crate::driver::error::MessageError;

/// Header length in bytes
pub const OP_MSG_HEADER_LEN: usize = 8;

/// Firmware operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Opcode {
    /// TX pipe suspended
    TxSuspend = 0,
    /// TX pipe resumed
    TxResume = 1,
    /// RX pipe suspended
    RxSuspend = 2,
    /// RX pipe resumed
    RxResume = 3,
    /// Statistics snapshot
    Stats = 4,
    /// Sharing statistics response
    SharingStats = 5,
    /// Quota programming response
    QuotaResponse = 6,
    /// Quota reached
    QuotaIndication = 7,
    /// Firmware image loaded
    Ready = 8,
}

impl Opcode {
    /// Number of defined opcodes
    pub const COUNT: usize = 9;

    /// Every opcode in wire order
    pub const ALL: [Opcode; Self::COUNT] = [
        Opcode::TxSuspend,
        Opcode::TxResume,
        Opcode::RxSuspend,
        Opcode::RxResume,
        Opcode::Stats,
        Opcode::SharingStats,
        Opcode::QuotaResponse,
        Opcode::QuotaIndication,
        Opcode::Ready,
    ];

    /// Slot index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name for logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Opcode::TxSuspend => "TX_SUSPEND",
            Opcode::TxResume => "TX_RESUME",
            Opcode::RxSuspend => "RX_SUSPEND",
            Opcode::RxResume => "RX_RESUME",
            Opcode::Stats => "STATS",
            Opcode::SharingStats => "SHARING_STATS",
            Opcode::QuotaResponse => "QUOTA_RSP",
            Opcode::QuotaIndication => "QUOTA_IND",
            Opcode::Ready => "UC_READY",
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = MessageError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(MessageError::UnknownOpcode(value))
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Message
// =============================================================================

/// A decoded operation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpMessage {
    /// Message type byte
    pub msg_type: u8,
    /// Operation code
    pub opcode: Opcode,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl OpMessage {
    /// Message without payload
    pub fn new(opcode: Opcode) -> Self {
        Self {
            msg_type: 0,
            opcode,
            payload: Vec::new(),
        }
    }

    /// Message carrying `payload`
    pub fn with_payload(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            msg_type: 0,
            opcode,
            payload,
        }
    }

    /// Parse a header and its payload from raw bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, MessageError> {
        let header = bytes
            .get(..OP_MSG_HEADER_LEN)
            .ok_or(MessageError::ShortHeader)?;
        let msg_type = header[0];
        let opcode = Opcode::try_from(u16::from_le_bytes([header[2], header[3]]))?;
        let len = usize::from(u16::from_le_bytes([header[4], header[5]]));
        let payload = bytes
            .get(OP_MSG_HEADER_LEN..OP_MSG_HEADER_LEN + len)
            .ok_or(MessageError::TruncatedPayload)?
            .to_vec();
        Ok(Self {
            msg_type,
            opcode,
            payload,
        })
    }

    /// Encode header and payload
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(OP_MSG_HEADER_LEN + self.payload.len());
        bytes.push(self.msg_type);
        bytes.push(0);
        bytes.extend_from_slice(&(self.opcode as u16).to_le_bytes());
        bytes.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Little-endian field reader over a payload
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let chunk = self
            .bytes
            .get(self.pos..self.pos + N)
            .ok_or(MessageError::TruncatedPayload)?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, MessageError> {
        self.take().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, MessageError> {
        self.take().map(u64::from_le_bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), MessageError> {
        if self.pos + n > self.bytes.len() {
            return Err(MessageError::TruncatedPayload);
        }
        self.pos += n;
        Ok(())
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Firmware data-path statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct UcFwStats {
    pub tx_comp_ring_base: u32,
    pub tx_comp_ring_size: u32,
    pub tx_comp_ring_dbell_addr: u32,
    pub tx_comp_ring_dbell_ind_val: u32,
    pub tx_comp_ring_dbell_cached_val: u32,
    pub tx_pkts_enqueued: u32,
    pub tx_pkts_completed: u32,
    pub tx_is_suspend: u32,
    pub tx_reserved: u32,
    pub rx_ind_ring_base: u32,
    pub rx_ind_ring_size: u32,
    pub rx_ind_ring_dbell_addr: u32,
    pub rx_ind_ring_dbell_ind_val: u32,
    pub rx_ind_ring_dbell_ind_cached_val: u32,
    pub rx_ind_ring_rdidx_addr: u32,
    pub rx_ind_ring_rd_idx_cached_val: u32,
    pub rx_refill_idx: u32,
    pub rx_num_pkts_indicated: u32,
    pub rx_buf_refilled: u32,
    pub rx_num_ind_drop_no_space: u32,
    pub rx_num_ind_drop_no_buf: u32,
    pub rx_is_suspend: u32,
    pub rx_reserved: u32,
}

impl UcFwStats {
    /// Encoded size
    pub const LEN: usize = 23 * 4;

    /// Decode from a payload
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(payload);
        Ok(Self {
            tx_comp_ring_base: r.u32()?,
            tx_comp_ring_size: r.u32()?,
            tx_comp_ring_dbell_addr: r.u32()?,
            tx_comp_ring_dbell_ind_val: r.u32()?,
            tx_comp_ring_dbell_cached_val: r.u32()?,
            tx_pkts_enqueued: r.u32()?,
            tx_pkts_completed: r.u32()?,
            tx_is_suspend: r.u32()?,
            tx_reserved: r.u32()?,
            rx_ind_ring_base: r.u32()?,
            rx_ind_ring_size: r.u32()?,
            rx_ind_ring_dbell_addr: r.u32()?,
            rx_ind_ring_dbell_ind_val: r.u32()?,
            rx_ind_ring_dbell_ind_cached_val: r.u32()?,
            rx_ind_ring_rdidx_addr: r.u32()?,
            rx_ind_ring_rd_idx_cached_val: r.u32()?,
            rx_refill_idx: r.u32()?,
            rx_num_pkts_indicated: r.u32()?,
            rx_buf_refilled: r.u32()?,
            rx_num_ind_drop_no_space: r.u32()?,
            rx_num_ind_drop_no_buf: r.u32()?,
            rx_is_suspend: r.u32()?,
            rx_reserved: r.u32()?,
        })
    }

    /// Encode to a payload
    pub fn encode(&self) -> Vec<u8> {
        [
            self.tx_comp_ring_base,
            self.tx_comp_ring_size,
            self.tx_comp_ring_dbell_addr,
            self.tx_comp_ring_dbell_ind_val,
            self.tx_comp_ring_dbell_cached_val,
            self.tx_pkts_enqueued,
            self.tx_pkts_completed,
            self.tx_is_suspend,
            self.tx_reserved,
            self.rx_ind_ring_base,
            self.rx_ind_ring_size,
            self.rx_ind_ring_dbell_addr,
            self.rx_ind_ring_dbell_ind_val,
            self.rx_ind_ring_dbell_ind_cached_val,
            self.rx_ind_ring_rdidx_addr,
            self.rx_ind_ring_rd_idx_cached_val,
            self.rx_refill_idx,
            self.rx_num_pkts_indicated,
            self.rx_buf_refilled,
            self.rx_num_ind_drop_no_space,
            self.rx_num_ind_drop_no_buf,
            self.rx_is_suspend,
            self.rx_reserved,
        ]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
    }

    /// Receive total used for bandwidth calibration
    pub const fn rx_total(&self) -> u32 {
        self.rx_num_ind_drop_no_space
            .wrapping_add(self.rx_num_ind_drop_no_buf)
            .wrapping_add(self.rx_num_pkts_indicated)
    }
}

/// IPv4/IPv6 traffic counters shared by the firmware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct SharingStats {
    pub ipv4_rx_packets: u64,
    pub ipv4_rx_bytes: u64,
    pub ipv6_rx_packets: u64,
    pub ipv6_rx_bytes: u64,
    pub ipv4_tx_packets: u64,
    pub ipv4_tx_bytes: u64,
    pub ipv6_tx_packets: u64,
    pub ipv6_tx_bytes: u64,
}

impl SharingStats {
    /// Encoded size
    pub const LEN: usize = 8 * 8;

    /// Decode from a payload
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(payload);
        Ok(Self {
            ipv4_rx_packets: r.u64()?,
            ipv4_rx_bytes: r.u64()?,
            ipv6_rx_packets: r.u64()?,
            ipv6_rx_bytes: r.u64()?,
            ipv4_tx_packets: r.u64()?,
            ipv4_tx_bytes: r.u64()?,
            ipv6_tx_packets: r.u64()?,
            ipv6_tx_bytes: r.u64()?,
        })
    }

    /// Encode to a payload
    pub fn encode(&self) -> Vec<u8> {
        [
            self.ipv4_rx_packets,
            self.ipv4_rx_bytes,
            self.ipv6_rx_packets,
            self.ipv6_rx_bytes,
            self.ipv4_tx_packets,
            self.ipv4_tx_bytes,
            self.ipv6_tx_packets,
            self.ipv6_tx_bytes,
        ]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
    }
}

/// Firmware answer to a quota request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuotaResponse {
    /// Whether the quota was accepted
    pub success: bool,
    /// Programmed quota in bytes
    pub quota_bytes: u64,
}

impl QuotaResponse {
    /// Encoded size
    pub const LEN: usize = 12;

    /// Decode from a payload
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(payload);
        let success = r.u8()? != 0;
        r.skip(3)?;
        let lo = r.u32()?;
        let hi = r.u32()?;
        Ok(Self {
            success,
            quota_bytes: (u64::from(hi) << 32) | u64::from(lo),
        })
    }

    /// Encode to a payload
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![u8::from(self.success), 0, 0, 0];
        bytes.extend_from_slice(&(self.quota_bytes as u32).to_le_bytes());
        bytes.extend_from_slice(&((self.quota_bytes >> 32) as u32).to_le_bytes());
        bytes
    }
}

/// Quota-reached notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuotaIndication {
    /// Quota in bytes
    pub quota_bytes: u64,
}

impl QuotaIndication {
    /// Decode from a payload
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        Ok(Self {
            quota_bytes: Reader::new(payload).u64()?,
        })
    }

    /// Encode to a payload
    pub fn encode(&self) -> Vec<u8> {
        self.quota_bytes.to_le_bytes().to_vec()
    }
}
