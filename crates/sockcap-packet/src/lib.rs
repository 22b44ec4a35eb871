pub mod checksum;
pub mod dissect;
mod error;
pub mod frame;
pub mod headers;
pub mod segment;

pub use checksum::{checksum, transport_checksum, InternetChecksum};
pub use dissect::{dissect, DissectedFrame, Ipv4Summary, TcpSummary, Transport, UdpSummary};
pub use error::PacketError;
pub use frame::{FlowEndpoints, FrameEncoder, TcpSegment, TCP_FRAME_OVERHEAD};
pub use headers::{
    EthernetHeader, Ipv4Header, TcpFlags, TcpHeader, UdpHeader, ETHERNET_HEADER_LEN,
    IPPROTO_TCP, IPPROTO_UDP, IPV4_HEADER_LEN, TCP_HEADER_LEN, UDP_HEADER_LEN,
};
pub use segment::{SegmentPolicy, MAX_UDP_PAYLOAD};
