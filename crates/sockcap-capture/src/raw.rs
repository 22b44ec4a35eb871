use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use sockcap_config::{CaptureType, ResolvedCapture};
use tracing::{info, warn};

use crate::guard::ErrorStateGuard;
use crate::logger::NetworkCaptureLogger;
use crate::socket::SocketId;
use crate::CaptureError;

/// Dumps decrypted TLS bytes verbatim into one sink per direction.
///
/// There is no per-socket separation and no framing. Socket-level reads and
/// writes are ignored.
#[derive(Debug)]
pub struct RawCaptureLogger<W: Write + Send> {
    read: Mutex<RawSink<W>>,
    write: Mutex<RawSink<W>>,
}

impl<W: Write + Send> RawCaptureLogger<W> {
    /// `None` disables a direction.
    pub fn new(read: Option<W>, write: Option<W>) -> Self {
        Self {
            read: Mutex::new(RawSink::new("read", read)),
            write: Mutex::new(RawSink::new("write", write)),
        }
    }

    pub fn into_sinks(self) -> (Option<W>, Option<W>) {
        let read = self
            .read
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .inner;
        let write = self
            .write
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .inner;
        (read, write)
    }
}

impl RawCaptureLogger<File> {
    /// Opens `<prefix>_read.bin` and `<prefix>_write.bin` in append mode, each
    /// only when its dump toggle is set.
    pub fn open(resolved: &ResolvedCapture) -> Result<Self, CaptureError> {
        if resolved.capture_type != CaptureType::Raw {
            return Err(CaptureError::ConfigurationMismatch {
                expected: resolved.capture_type,
                found: CaptureType::Raw,
            });
        }

        let read = resolved
            .dump_ssl_read
            .then(|| open_append(&resolved.raw_read_path()))
            .transpose()?;
        let write = resolved
            .dump_ssl_write
            .then(|| open_append(&resolved.raw_write_path()))
            .transpose()?;

        info!(
            read = %resolved.raw_read_path().display(),
            read_enabled = resolved.dump_ssl_read,
            write = %resolved.raw_write_path().display(),
            write_enabled = resolved.dump_ssl_write,
            "raw capture opened"
        );
        Ok(Self::new(read, write))
    }
}

impl<W: Write + Send> NetworkCaptureLogger for RawCaptureLogger<W> {
    fn log_ssl_read(&self, data: &[u8], _socket: SocketId) {
        let _guard = ErrorStateGuard::capture();
        self.read
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(data);
    }

    fn log_ssl_write(&self, data: &[u8], _socket: SocketId) {
        let _guard = ErrorStateGuard::capture();
        self.write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(data);
    }

    fn log_read(&self, _data: &[u8], _socket: SocketId, _from: Option<SocketAddr>) {}

    fn log_write(&self, _data: &[u8], _socket: SocketId, _to: Option<SocketAddr>) {}

    fn capture_type(&self) -> CaptureType {
        CaptureType::Raw
    }
}

#[derive(Debug)]
struct RawSink<W> {
    label: &'static str,
    inner: Option<W>,
}

impl<W: Write> RawSink<W> {
    const fn new(label: &'static str, inner: Option<W>) -> Self {
        Self { label, inner }
    }

    fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Some(sink) = self.inner.as_mut() else {
            return;
        };
        if let Err(error) = sink.write_all(data).and_then(|()| sink.flush()) {
            warn!(
                sink = self.label,
                %error,
                "raw dump write failed; sink disabled"
            );
            self.inner = None;
        }
    }
}

fn open_append(path: &Path) -> Result<File, CaptureError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| CaptureError::OpenSink {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use super::RawCaptureLogger;
    use crate::logger::NetworkCaptureLogger;
    use crate::socket::SocketId;

    #[test]
    fn directions_go_to_separate_sinks_without_socket_separation() {
        let logger = RawCaptureLogger::new(Some(Vec::new()), Some(Vec::new()));
        logger.log_ssl_read(b"HTTP/1.1 200", SocketId(1));
        logger.log_ssl_write(b"GET /", SocketId(1));
        logger.log_ssl_read(b" OK", SocketId(2));
        logger.log_read(b"ignored", SocketId(1), None);
        logger.log_write(b"ignored", SocketId(1), None);

        let (read, write) = logger.into_sinks();
        assert_eq!(read.expect("read sink"), b"HTTP/1.1 200 OK");
        assert_eq!(write.expect("write sink"), b"GET /");
    }

    #[test]
    fn disabled_direction_is_skipped() {
        let logger = RawCaptureLogger::new(None, Some(Vec::new()));
        logger.log_ssl_read(b"dropped", SocketId(1));
        logger.log_ssl_write(b"kept", SocketId(1));

        let (read, write) = logger.into_sinks();
        assert!(read.is_none());
        assert_eq!(write.expect("write sink"), b"kept");
    }

    struct BrokenSink {
        attempts: usize,
    }

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failing_sink_is_disabled_after_first_error() {
        let logger = RawCaptureLogger::new(Some(BrokenSink { attempts: 0 }), None);
        logger.log_ssl_read(b"one", SocketId(1));
        logger.log_ssl_read(b"two", SocketId(1));

        let (read, _) = logger.into_sinks();
        assert!(read.is_none());
    }
}
