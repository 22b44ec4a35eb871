use std::net::SocketAddr;

use sockcap_config::CaptureType;

use crate::socket::SocketId;

/// Sink for guest socket traffic.
///
/// Every operation is infallible from the caller's point of view, accepts
/// empty payloads without emitting anything, and leaves the calling thread's
/// host error indicator as it found it.
pub trait NetworkCaptureLogger: Send + Sync {
    /// Decrypted bytes received on a TLS connection.
    fn log_ssl_read(&self, data: &[u8], socket: SocketId);

    /// Plaintext bytes about to be encrypted on a TLS connection.
    fn log_ssl_write(&self, data: &[u8], socket: SocketId);

    /// Bytes received on `socket`. `from` overrides the connected peer.
    fn log_read(&self, data: &[u8], socket: SocketId, from: Option<SocketAddr>);

    /// Bytes sent on `socket`. `to` overrides the connected peer.
    fn log_write(&self, data: &[u8], socket: SocketId, to: Option<SocketAddr>);

    fn capture_type(&self) -> CaptureType;
}

impl<T: NetworkCaptureLogger + ?Sized> NetworkCaptureLogger for Box<T> {
    fn log_ssl_read(&self, data: &[u8], socket: SocketId) {
        (**self).log_ssl_read(data, socket);
    }

    fn log_ssl_write(&self, data: &[u8], socket: SocketId) {
        (**self).log_ssl_write(data, socket);
    }

    fn log_read(&self, data: &[u8], socket: SocketId, from: Option<SocketAddr>) {
        (**self).log_read(data, socket, from);
    }

    fn log_write(&self, data: &[u8], socket: SocketId, to: Option<SocketAddr>) {
        (**self).log_write(data, socket, to);
    }

    fn capture_type(&self) -> CaptureType {
        (**self).capture_type()
    }
}

/// Capture disabled: every operation is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCaptureLogger;

impl NetworkCaptureLogger for NullCaptureLogger {
    fn log_ssl_read(&self, _data: &[u8], _socket: SocketId) {}

    fn log_ssl_write(&self, _data: &[u8], _socket: SocketId) {}

    fn log_read(&self, _data: &[u8], _socket: SocketId, _from: Option<SocketAddr>) {}

    fn log_write(&self, _data: &[u8], _socket: SocketId, _to: Option<SocketAddr>) {}

    fn capture_type(&self) -> CaptureType {
        CaptureType::None
    }
}
