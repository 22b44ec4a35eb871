use thiserror::Error;

pub mod prelude {
    pub use sockcap_capture::{
        open_logger, CaptureType, ErrorStateGuard, HostSocketResolver, NetworkCaptureLogger,
        NullCaptureLogger, PcapCaptureLogger, PcapOptions, RawCaptureLogger, SocketId,
        SocketKind, SocketResolver, StaticSocket, StaticSocketResolver, StreamLimits,
    };
    pub use sockcap_config::{CaptureConfig, CaptureMode, ResolvedCapture};
    pub use sockcap_packet::{dissect, FrameEncoder, SegmentPolicy, Transport};
    pub use sockcap_pcap::{
        ethernet_header, recover_records, PcapHeader, PcapWriter, RecoveryReport,
    };
}

pub type Result<T> = std::result::Result<T, SockcapError>;

#[derive(Debug, Error)]
pub enum SockcapError {
    #[error(transparent)]
    Config(#[from] sockcap_config::ConfigError),
    #[error(transparent)]
    Capture(#[from] sockcap_capture::CaptureError),
    #[error(transparent)]
    Resolve(#[from] sockcap_capture::ResolveError),
    #[error(transparent)]
    Packet(#[from] sockcap_packet::PacketError),
    #[error(transparent)]
    Pcap(#[from] sockcap_pcap::PcapError),
}
