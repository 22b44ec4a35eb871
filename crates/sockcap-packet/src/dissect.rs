//! Read-side view of synthetic frames, used to audit exported captures.

use std::net::Ipv4Addr;

use etherparse::{
    Ethernet2HeaderSlice, InternetSlice, Ipv4HeaderSlice, ReadError, SlicedPacket,
    TcpHeaderSlice, TransportSlice, UdpHeaderSlice,
};

use crate::headers::{TcpFlags, ETHERNET_HEADER_LEN, ETHERTYPE_IPV4, UDP_HEADER_LEN};
use crate::PacketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Summary {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub identification: u16,
    pub ttl: u8,
    pub total_len: u16,
    pub more_fragments: bool,
    pub fragment_offset: u16,
    pub header_checksum_valid: bool,
}

impl Ipv4Summary {
    #[must_use]
    pub const fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSummary<'a> {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub payload: &'a [u8],
    pub checksum_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSummary<'a> {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: &'a [u8],
    pub checksum_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport<'a> {
    Tcp(TcpSummary<'a>),
    Udp(UdpSummary<'a>),
    /// Part of a fragmented datagram; transport checks need reassembly.
    Fragment(&'a [u8]),
    Other { protocol: u8, payload: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DissectedFrame<'a> {
    pub ipv4: Ipv4Summary,
    pub transport: Transport<'a>,
}

/// Splits a synthetic Ethernet/IPv4 frame into its headers and validates the
/// IPv4 and transport checksums. Bytes past the IPv4 total length are ignored.
pub fn dissect(frame: &[u8]) -> Result<DissectedFrame<'_>, PacketError> {
    ensure_len("ethernet", frame, ETHERNET_HEADER_LEN)?;
    let ethertype = Ethernet2HeaderSlice::from_slice(frame)?.ether_type();
    if ethertype != ETHERTYPE_IPV4 {
        return Err(PacketError::UnsupportedEtherType { ethertype });
    }

    let sliced = SlicedPacket::from_ethernet(frame)?;
    let Some(InternetSlice::Ipv4(header, _)) = &sliced.ip else {
        return Err(PacketError::Malformed {
            reason: "ipv4 ethertype without an ipv4 header".to_owned(),
        });
    };

    let packet = &frame[ETHERNET_HEADER_LEN..];
    let header_len = usize::from(header.ihl()) * 4;
    let total_len = header.total_len();
    if usize::from(total_len) < header_len {
        return Err(PacketError::InvalidHeaderLength { len: header_len });
    }
    ensure_len("ipv4", packet, usize::from(total_len))?;

    let ipv4 = Ipv4Summary {
        source: header.source_addr(),
        destination: header.destination_addr(),
        protocol: header.protocol(),
        identification: header.identification(),
        ttl: header.ttl(),
        total_len,
        more_fragments: header.more_fragments(),
        fragment_offset: header.fragments_offset(),
        header_checksum_valid: header_checksum_matches(header),
    };

    let body = &packet[header_len..usize::from(total_len)];
    let transport = if ipv4.is_fragment() {
        Transport::Fragment(body)
    } else {
        match &sliced.transport {
            Some(TransportSlice::Tcp(tcp)) => Transport::Tcp(tcp_summary(&ipv4, tcp, body)?),
            Some(TransportSlice::Udp(udp)) => Transport::Udp(udp_summary(&ipv4, udp, body)?),
            _ => Transport::Other {
                protocol: ipv4.protocol,
                payload: body,
            },
        }
    };

    Ok(DissectedFrame { ipv4, transport })
}

fn header_checksum_matches(header: &Ipv4HeaderSlice<'_>) -> bool {
    header
        .to_header()
        .calc_header_checksum()
        .is_ok_and(|sum| sum == header.header_checksum())
}

fn tcp_summary<'a>(
    ipv4: &Ipv4Summary,
    tcp: &TcpHeaderSlice<'_>,
    segment: &'a [u8],
) -> Result<TcpSummary<'a>, PacketError> {
    let data_offset = tcp.slice().len();
    ensure_len("tcp", segment, data_offset)?;
    let payload = &segment[data_offset..];

    let checksum_valid = tcp
        .calc_checksum_ipv4_raw(ipv4.source.octets(), ipv4.destination.octets(), payload)
        .is_ok_and(|sum| sum == tcp.checksum());

    Ok(TcpSummary {
        source_port: tcp.source_port(),
        destination_port: tcp.destination_port(),
        sequence: tcp.sequence_number(),
        acknowledgement: tcp.acknowledgment_number(),
        flags: TcpFlags::from_bits(tcp.slice()[13]),
        window: tcp.window_size(),
        payload,
        checksum_valid,
    })
}

fn udp_summary<'a>(
    ipv4: &Ipv4Summary,
    udp: &UdpHeaderSlice<'_>,
    datagram: &'a [u8],
) -> Result<UdpSummary<'a>, PacketError> {
    ensure_len("udp", datagram, UDP_HEADER_LEN)?;
    let payload = &datagram[UDP_HEADER_LEN..];

    let checksum_valid = udp
        .to_header()
        .calc_checksum_ipv4_raw(ipv4.source.octets(), ipv4.destination.octets(), payload)
        .is_ok_and(|sum| sum == udp.checksum());

    Ok(UdpSummary {
        source_port: udp.source_port(),
        destination_port: udp.destination_port(),
        payload,
        checksum_valid,
    })
}

impl From<ReadError> for PacketError {
    fn from(error: ReadError) -> Self {
        match error {
            ReadError::Ipv4UnexpectedVersion(version) => Self::UnsupportedIpVersion { version },
            ReadError::Ipv4HeaderLengthBad(ihl) => Self::InvalidHeaderLength {
                len: usize::from(ihl) * 4,
            },
            other => Self::Malformed {
                reason: other.to_string(),
            },
        }
    }
}

fn ensure_len(layer: &'static str, bytes: &[u8], needed: usize) -> Result<(), PacketError> {
    if bytes.len() < needed {
        return Err(PacketError::Truncated {
            layer,
            needed,
            actual: bytes.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use etherparse::PacketBuilder;

    use super::{dissect, Transport};
    use crate::PacketError;

    fn foreign_tcp_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([2; 6], [4; 6])
            .ipv4([10, 0, 0, 1], [192, 0, 2, 80], 64)
            .tcp(40_000, 443, 7_000, 1_024)
            .psh()
            .ack(9_000);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).expect("build frame");
        frame
    }

    #[test]
    fn reads_frames_built_by_another_encoder() {
        let frame = foreign_tcp_frame(b"GET / HTTP/1.1\r\n");
        let parsed = dissect(&frame).expect("dissect");
        assert!(parsed.ipv4.header_checksum_valid);
        assert_eq!(parsed.ipv4.ttl, 64);

        let Transport::Tcp(tcp) = parsed.transport else {
            panic!("expected tcp, got {:?}", parsed.transport);
        };
        assert_eq!((tcp.source_port, tcp.destination_port), (40_000, 443));
        assert_eq!((tcp.sequence, tcp.acknowledgement), (7_000, 9_000));
        assert_eq!(tcp.window, 1_024);
        assert_eq!(tcp.payload, b"GET / HTTP/1.1\r\n");
        assert!(tcp.checksum_valid);
    }

    #[test]
    fn flipped_payload_bit_fails_the_tcp_checksum() {
        let mut frame = foreign_tcp_frame(b"payload");
        let last = frame.len() - 1;
        frame[last] ^= 0x01;

        let parsed = dissect(&frame).expect("dissect");
        assert!(parsed.ipv4.header_checksum_valid);
        assert!(matches!(parsed.transport, Transport::Tcp(tcp) if !tcp.checksum_valid));
    }

    #[test]
    fn corrupted_ttl_fails_the_header_checksum() {
        let mut frame = foreign_tcp_frame(b"payload");
        frame[14 + 8] = 1;
        assert!(!dissect(&frame).expect("dissect").ipv4.header_checksum_valid);
    }

    #[test]
    fn rejects_truncated_ethernet_header() {
        assert_eq!(
            dissect(&[0u8; 10]),
            Err(PacketError::Truncated {
                layer: "ethernet",
                needed: 14,
                actual: 10
            })
        );
    }

    #[test]
    fn rejects_non_ipv4_ethertype() {
        let mut frame = [0u8; 60];
        frame[12] = 0x86;
        frame[13] = 0xDD;
        assert_eq!(
            dissect(&frame),
            Err(PacketError::UnsupportedEtherType { ethertype: 0x86DD })
        );
    }

    #[test]
    fn rejects_ipv6_version_nibble() {
        let mut frame = [0u8; 60];
        frame[12] = 0x08;
        frame[14] = 0x65;
        assert_eq!(
            dissect(&frame),
            Err(PacketError::UnsupportedIpVersion { version: 6 })
        );
    }

    #[test]
    fn rejects_total_length_past_end_of_frame() {
        let mut frame = [0u8; 40];
        frame[12] = 0x08;
        frame[14] = 0x45;
        frame[16] = 0x05;
        frame[17] = 0xDC;
        assert!(matches!(
            dissect(&frame),
            Err(PacketError::Truncated { layer: "ipv4", .. })
        ));
    }
}
