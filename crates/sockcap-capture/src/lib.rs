mod error;
pub mod guard;
pub mod logger;
pub mod pcap;
pub mod raw;
pub mod session;
pub mod socket;

use std::sync::Arc;

use sockcap_config::ResolvedCapture;

pub use error::{CaptureError, ResolveError};
pub use guard::ErrorStateGuard;
pub use logger::{NetworkCaptureLogger, NullCaptureLogger};
pub use pcap::{PcapCaptureLogger, PcapOptions};
pub use raw::RawCaptureLogger;
pub use session::{Direction, SequenceState, StreamKey, StreamLimits};
pub use sockcap_config::CaptureType;
pub use socket::{
    HostSocketResolver, SocketId, SocketKind, SocketResolver, StaticSocket, StaticSocketResolver,
};

/// Builds the logger selected by a resolved configuration.
///
/// `resolver` is only consulted by the PCAP variant.
pub fn open_logger(
    resolved: &ResolvedCapture,
    resolver: Arc<dyn SocketResolver>,
) -> Result<Box<dyn NetworkCaptureLogger>, CaptureError> {
    Ok(match resolved.capture_type {
        CaptureType::None => Box::new(NullCaptureLogger),
        CaptureType::Raw => Box::new(RawCaptureLogger::open(resolved)?),
        CaptureType::Pcap => Box::new(PcapCaptureLogger::open(resolved, resolver)?),
    })
}
