use std::slice::Chunks;

use crate::headers::{ETHERNET_HEADER_LEN, IPV4_HEADER_LEN, TCP_HEADER_LEN, UDP_HEADER_LEN};
use crate::PacketError;

/// Largest UDP payload a single (possibly fragmented) IPv4 datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = u16::MAX as usize - IPV4_HEADER_LEN - UDP_HEADER_LEN;

/// Path MTU assumptions used to cut payloads into synthetic segments.
///
/// The MTU counts the IPv4 packet only; the Ethernet header is framing on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPolicy {
    mtu: usize,
}

impl SegmentPolicy {
    pub const DEFAULT_MTU: usize = 1500;
    /// RFC 791 minimum every IPv4 link must carry.
    pub const MIN_MTU: usize = 68;
    /// Keeps every frame, Ethernet header included, within a 65535-byte
    /// pcap snapshot length.
    pub const MAX_MTU: usize = u16::MAX as usize - ETHERNET_HEADER_LEN;

    pub fn new(mtu: usize) -> Result<Self, PacketError> {
        if !(Self::MIN_MTU..=Self::MAX_MTU).contains(&mtu) {
            return Err(PacketError::InvalidMtu {
                mtu,
                min: Self::MIN_MTU,
                max: Self::MAX_MTU,
            });
        }

        Ok(Self { mtu })
    }

    #[must_use]
    pub const fn mtu(&self) -> usize {
        self.mtu
    }

    /// Largest TCP payload per segment: MTU minus IPv4 and TCP headers.
    #[must_use]
    pub const fn max_segment_size(&self) -> usize {
        self.mtu - IPV4_HEADER_LEN - TCP_HEADER_LEN
    }

    /// Largest IPv4 payload per fragment, rounded down to the 8-byte fragment unit.
    #[must_use]
    pub const fn max_fragment_payload(&self) -> usize {
        (self.mtu - IPV4_HEADER_LEN) & !7
    }

    /// Splits `payload` into consecutive chunks of at most one MSS each.
    ///
    /// An empty payload yields no chunks.
    #[must_use]
    pub fn segments<'a>(&self, payload: &'a [u8]) -> Chunks<'a, u8> {
        payload.chunks(self.max_segment_size())
    }
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        Self {
            mtu: Self::DEFAULT_MTU,
        }
    }
}
