use std::net::Ipv4Addr;

use crate::checksum::{checksum, transport_checksum};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

pub const DEFAULT_TTL: u8 = 64;
pub const DEFAULT_TCP_WINDOW: u16 = 0xFFFF;

const IPV4_VERSION_IHL: u8 = 0x45;
const IPV4_FLAG_MORE_FRAGMENTS: u16 = 0x2000;
const TCP_DATA_OFFSET_WORDS: u8 = (TCP_HEADER_LEN / 4) as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Link header for synthetic IPv4 frames. Hardware addresses are zeroed since
    /// the frames never crossed a real link.
    #[must_use]
    pub const fn ipv4() -> Self {
        Self {
            destination: [0; 6],
            source: [0; 6],
            ethertype: ETHERTYPE_IPV4,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; ETHERNET_HEADER_LEN] {
        let mut bytes = [0u8; ETHERNET_HEADER_LEN];
        bytes[0..6].copy_from_slice(&self.destination);
        bytes[6..12].copy_from_slice(&self.source);
        bytes[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub identification: u16,
    pub ttl: u8,
    /// Bytes carried after the IPv4 header in this packet.
    pub payload_len: u16,
    pub more_fragments: bool,
    /// Fragment offset in 8-byte units.
    pub fragment_offset: u16,
}

impl Ipv4Header {
    #[must_use]
    pub fn total_len(&self) -> u16 {
        (IPV4_HEADER_LEN as u16).saturating_add(self.payload_len)
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut flags_and_offset = self.fragment_offset & 0x1FFF;
        if self.more_fragments {
            flags_and_offset |= IPV4_FLAG_MORE_FRAGMENTS;
        }

        let mut bytes = [0u8; IPV4_HEADER_LEN];
        bytes[0] = IPV4_VERSION_IHL;
        bytes[1] = 0;
        bytes[2..4].copy_from_slice(&self.total_len().to_be_bytes());
        bytes[4..6].copy_from_slice(&self.identification.to_be_bytes());
        bytes[6..8].copy_from_slice(&flags_and_offset.to_be_bytes());
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        bytes[12..16].copy_from_slice(&self.source.octets());
        bytes[16..20].copy_from_slice(&self.destination.octets());

        let sum = checksum(&bytes);
        bytes[10..12].copy_from_slice(&sum.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: Self = Self(0x01);
    pub const SYN: Self = Self(0x02);
    pub const RST: Self = Self(0x04);
    pub const PSH: Self = Self(0x08);
    pub const ACK: Self = Self(0x10);
    pub const PSH_ACK: Self = Self(0x08 | 0x10);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub flags: TcpFlags,
    pub window: u16,
}

impl TcpHeader {
    /// Encodes the header with its checksum computed over the pseudo-header,
    /// this header and `payload`.
    #[must_use]
    pub fn to_bytes(
        &self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        payload: &[u8],
    ) -> [u8; TCP_HEADER_LEN] {
        let mut bytes = [0u8; TCP_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.acknowledgement.to_be_bytes());
        bytes[12] = TCP_DATA_OFFSET_WORDS << 4;
        bytes[13] = self.flags.bits();
        bytes[14..16].copy_from_slice(&self.window.to_be_bytes());

        let sum = transport_checksum(source, destination, IPPROTO_TCP, &bytes, payload);
        bytes[16..18].copy_from_slice(&sum.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
}

impl UdpHeader {
    #[must_use]
    pub fn to_bytes(
        &self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        payload: &[u8],
    ) -> [u8; UDP_HEADER_LEN] {
        let length = (UDP_HEADER_LEN + payload.len()) as u16;

        let mut bytes = [0u8; UDP_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        bytes[4..6].copy_from_slice(&length.to_be_bytes());

        let sum = match transport_checksum(source, destination, IPPROTO_UDP, &bytes, payload) {
            // zero means "no checksum" for UDP over IPv4
            0 => 0xFFFF,
            sum => sum,
        };
        bytes[6..8].copy_from_slice(&sum.to_be_bytes());
        bytes
    }
}
