use std::net::SocketAddrV4;

use bytes::{BufMut, Bytes, BytesMut};

use crate::headers::{
    EthernetHeader, Ipv4Header, TcpFlags, TcpHeader, UdpHeader, DEFAULT_TCP_WINDOW, DEFAULT_TTL,
    ETHERNET_HEADER_LEN, IPPROTO_TCP, IPPROTO_UDP, IPV4_HEADER_LEN, TCP_HEADER_LEN,
    UDP_HEADER_LEN,
};
use crate::segment::{SegmentPolicy, MAX_UDP_PAYLOAD};
use crate::PacketError;

/// Overhead in front of every TCP payload byte in a synthetic frame.
pub const TCP_FRAME_OVERHEAD: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN;

/// Direction-resolved addressing of one synthetic packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowEndpoints {
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
}

impl FlowEndpoints {
    #[must_use]
    pub const fn new(source: SocketAddrV4, destination: SocketAddrV4) -> Self {
        Self {
            source,
            destination,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub endpoints: FlowEndpoints,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub payload: &'a [u8],
}

/// Builds complete Ethernet/IPv4 frames around transport payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    policy: SegmentPolicy,
    ttl: u8,
    window: u16,
}

impl FrameEncoder {
    #[must_use]
    pub const fn new(policy: SegmentPolicy) -> Self {
        Self {
            policy,
            ttl: DEFAULT_TTL,
            window: DEFAULT_TCP_WINDOW,
        }
    }

    #[must_use]
    pub const fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> SegmentPolicy {
        self.policy
    }

    /// Encodes one PSH+ACK segment. The payload must already fit in one MSS.
    pub fn tcp_frame(
        &self,
        segment: &TcpSegment<'_>,
        identification: u16,
    ) -> Result<Bytes, PacketError> {
        let max = self.policy.max_segment_size();
        if segment.payload.len() > max {
            return Err(PacketError::SegmentTooLarge {
                len: segment.payload.len(),
                max,
            });
        }

        let source = *segment.endpoints.source.ip();
        let destination = *segment.endpoints.destination.ip();
        let tcp = TcpHeader {
            source_port: segment.endpoints.source.port(),
            destination_port: segment.endpoints.destination.port(),
            sequence: segment.sequence,
            acknowledgement: segment.acknowledgement,
            flags: TcpFlags::PSH_ACK,
            window: self.window,
        };
        let ip = Ipv4Header {
            source,
            destination,
            protocol: IPPROTO_TCP,
            identification,
            ttl: self.ttl,
            payload_len: (TCP_HEADER_LEN + segment.payload.len()) as u16,
            more_fragments: false,
            fragment_offset: 0,
        };

        let mut frame = BytesMut::with_capacity(TCP_FRAME_OVERHEAD + segment.payload.len());
        frame.put_slice(&EthernetHeader::ipv4().to_bytes());
        frame.put_slice(&ip.to_bytes());
        frame.put_slice(&tcp.to_bytes(source, destination, segment.payload));
        frame.put_slice(segment.payload);
        Ok(frame.freeze())
    }

    /// Encodes one UDP datagram, split into IPv4 fragments when it does not fit
    /// the MTU. All fragments share `identification`.
    pub fn udp_frames(
        &self,
        endpoints: &FlowEndpoints,
        payload: &[u8],
        identification: u16,
    ) -> Result<Vec<Bytes>, PacketError> {
        if payload.len() > MAX_UDP_PAYLOAD {
            return Err(PacketError::DatagramTooLarge {
                len: payload.len(),
                max: MAX_UDP_PAYLOAD,
            });
        }

        let source = *endpoints.source.ip();
        let destination = *endpoints.destination.ip();
        let udp = UdpHeader {
            source_port: endpoints.source.port(),
            destination_port: endpoints.destination.port(),
        };

        let mut datagram = BytesMut::with_capacity(UDP_HEADER_LEN + payload.len());
        datagram.put_slice(&udp.to_bytes(source, destination, payload));
        datagram.put_slice(payload);
        let datagram = datagram.freeze();

        let fragment_len = if datagram.len() + IPV4_HEADER_LEN <= self.policy.mtu() {
            datagram.len()
        } else {
            self.policy.max_fragment_payload()
        };

        let count = datagram.len().div_ceil(fragment_len);
        let mut frames = Vec::with_capacity(count);
        for (index, fragment) in datagram.chunks(fragment_len).enumerate() {
            let ip = Ipv4Header {
                source,
                destination,
                protocol: IPPROTO_UDP,
                identification,
                ttl: self.ttl,
                payload_len: fragment.len() as u16,
                more_fragments: index + 1 < count,
                fragment_offset: ((index * fragment_len) / 8) as u16,
            };

            let mut frame =
                BytesMut::with_capacity(ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + fragment.len());
            frame.put_slice(&EthernetHeader::ipv4().to_bytes());
            frame.put_slice(&ip.to_bytes());
            frame.put_slice(fragment);
            frames.push(frame.freeze());
        }

        Ok(frames)
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(SegmentPolicy::default())
    }
}
