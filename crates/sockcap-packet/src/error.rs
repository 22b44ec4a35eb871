use thiserror::Error;

/// Failures raised while building or dissecting synthetic frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("mtu {mtu} is outside the supported IPv4 range {min}..={max}")]
    InvalidMtu { mtu: usize, min: usize, max: usize },

    #[error("tcp segment payload of {len} bytes exceeds the maximum segment size {max}")]
    SegmentTooLarge { len: usize, max: usize },

    #[error("udp datagram payload of {len} bytes exceeds the IPv4 limit of {max}")]
    DatagramTooLarge { len: usize, max: usize },

    #[error("truncated {layer} header: need {needed} bytes, found {actual}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("unsupported ethertype {ethertype:#06x}")]
    UnsupportedEtherType { ethertype: u16 },

    #[error("unsupported ip version {version}")]
    UnsupportedIpVersion { version: u8 },

    #[error("ipv4 header length {len} is invalid")]
    InvalidHeaderLength { len: usize },

    #[error("malformed frame: {reason}")]
    Malformed { reason: String },
}
