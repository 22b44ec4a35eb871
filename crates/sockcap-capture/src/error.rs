use std::io;
use std::path::PathBuf;

use sockcap_config::{CaptureType, ConfigError};
use sockcap_pcap::PcapError;
use thiserror::Error;

use crate::socket::SocketId;

/// Failures opening or closing a capture logger. The logging operations
/// themselves never surface errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pcap(#[from] PcapError),

    #[error("failed to open capture file `{}`: {source}", path.display())]
    OpenSink { path: PathBuf, source: io::Error },

    #[error("logger for `{found}` capture cannot be built from a `{expected}` configuration")]
    ConfigurationMismatch {
        expected: CaptureType,
        found: CaptureType,
    },
}

/// Why endpoint or type metadata could not be read from a socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("socket {socket} query `{operation}` failed with errno {errno}")]
    Os {
        socket: SocketId,
        operation: &'static str,
        errno: i32,
    },

    #[error("socket {socket} is not registered")]
    UnknownSocket { socket: SocketId },

    #[error("socket {socket} has no connected peer")]
    NotConnected { socket: SocketId },

    #[error("socket {socket} uses an unsupported address family {family}")]
    UnsupportedFamily { socket: SocketId, family: i32 },

    #[error("socket {socket} endpoint queries are unsupported on this platform")]
    Unsupported { socket: SocketId },
}
