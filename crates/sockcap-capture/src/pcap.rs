use std::fs::File;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use sockcap_config::{CaptureType, ResolvedCapture};
use sockcap_packet::SegmentPolicy;
use sockcap_pcap::{ethernet_header, PcapWriter, RecordSink};
use tracing::{debug, info, warn};

use crate::guard::ErrorStateGuard;
use crate::logger::NetworkCaptureLogger;
use crate::session::{
    CaptureSession, Direction, SequenceState, SessionError, StreamKey, StreamLimits,
};
use crate::socket::{SocketId, SocketKind, SocketResolver};
use crate::{CaptureError, ResolveError};

/// Segmenting, stream tracking, and which decrypted directions are written
/// to the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapOptions {
    pub policy: SegmentPolicy,
    pub streams: StreamLimits,
    pub dump_ssl_read: bool,
    pub dump_ssl_write: bool,
}

impl Default for PcapOptions {
    fn default() -> Self {
        Self {
            policy: SegmentPolicy::default(),
            streams: StreamLimits::default(),
            dump_ssl_read: true,
            dump_ssl_write: true,
        }
    }
}

impl From<&ResolvedCapture> for PcapOptions {
    fn from(value: &ResolvedCapture) -> Self {
        Self {
            policy: value.policy,
            streams: StreamLimits::default(),
            dump_ssl_read: value.dump_ssl_read,
            dump_ssl_write: value.dump_ssl_write,
        }
    }
}

/// Turns logged payloads into synthetic Ethernet/IPv4 frames in a pcap file.
///
/// Socket reads and writes become TCP segments or UDP datagrams depending on
/// the socket type; decrypted TLS bytes always become TCP segments. Endpoints
/// are resolved from the live socket on every call.
pub struct PcapCaptureLogger<W: RecordSink + Send, R: SocketResolver> {
    session: Mutex<CaptureSession<W>>,
    resolver: R,
    options: PcapOptions,
}

impl<W: RecordSink + Send, R: SocketResolver> PcapCaptureLogger<W, R> {
    /// Writes and flushes the global header before returning.
    pub fn new(sink: W, resolver: R, options: PcapOptions) -> Result<Self, CaptureError> {
        let writer = PcapWriter::new(sink, ethernet_header())?;
        Ok(Self {
            session: Mutex::new(CaptureSession::new(writer, options.policy, options.streams)),
            resolver,
            options,
        })
    }

    #[must_use]
    pub const fn options(&self) -> &PcapOptions {
        &self.options
    }

    #[must_use]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// `false` once a write failure has stopped the capture.
    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    pub fn frames_written(&self) -> u64 {
        self.lock().frames()
    }

    /// Current counters for one stream, if it is still tracked.
    pub fn sequence(&self, key: &StreamKey) -> Option<SequenceState> {
        self.lock().sequence(key)
    }

    pub fn tracked_streams(&self) -> usize {
        self.lock().tracked_streams()
    }

    /// Flushes and closes the trace, returning the sink. `None` when the
    /// session was degraded by an earlier write failure.
    pub fn finish(self) -> Result<Option<W>, CaptureError> {
        let mut this = self;
        let writer = this
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take_writer();
        match writer {
            Some(writer) => {
                let records = writer.records();
                let sink = writer.into_inner()?;
                info!(records, "pcap capture closed");
                Ok(Some(sink))
            }
            None => Ok(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureSession<W>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_ssl(&self, direction: Direction, data: &[u8], socket: SocketId) {
        let _guard = ErrorStateGuard::capture();
        if data.is_empty() {
            return;
        }

        let key = match self.stream_key(socket, None) {
            Ok(key) => key,
            Err(reason) => {
                debug!(%socket, %reason, "decrypted payload not captured");
                return;
            }
        };
        self.emit_tcp(key, direction, data);
    }

    fn log_socket(
        &self,
        direction: Direction,
        data: &[u8],
        socket: SocketId,
        peer: Option<SocketAddr>,
    ) {
        let _guard = ErrorStateGuard::capture();
        if data.is_empty() {
            return;
        }

        let kind = match self.resolver.socket_kind(socket) {
            Ok(kind) => kind,
            Err(error) => {
                debug!(%socket, %error, "socket type unavailable; payload not captured");
                return;
            }
        };
        let key = match self.stream_key(socket, peer) {
            Ok(key) => key,
            Err(reason) => {
                debug!(%socket, %reason, "socket payload not captured");
                return;
            }
        };

        match kind {
            SocketKind::Stream => self.emit_tcp(key, direction, data),
            SocketKind::Datagram => self.emit_udp(key, direction, data),
            SocketKind::Other(kind) => {
                debug!(%socket, kind, "unsupported socket type; payload not captured");
            }
        }
    }

    fn stream_key(
        &self,
        socket: SocketId,
        peer: Option<SocketAddr>,
    ) -> Result<StreamKey, SkipReason> {
        let local = ipv4(self.resolver.local_addr(socket)?)?;
        let peer = match peer {
            Some(peer) => peer,
            None => self.resolver.peer_addr(socket)?,
        };
        let peer = ipv4(peer)?;
        Ok(StreamKey::new(socket, local, peer))
    }

    fn emit_tcp(&self, key: StreamKey, direction: Direction, data: &[u8]) {
        let mut session = self.lock();
        let result = session.emit_tcp(key, direction, data, SystemTime::now());
        Self::settle(&mut session, result);
    }

    fn emit_udp(&self, key: StreamKey, direction: Direction, data: &[u8]) {
        let mut session = self.lock();
        let result = session.emit_udp(key.endpoints(direction), data, SystemTime::now());
        Self::settle(&mut session, result);
    }

    fn settle(session: &mut CaptureSession<W>, result: Result<(), SessionError>) {
        match result {
            Ok(()) => {}
            Err(SessionError::Pcap(error)) => session.degrade(&error),
            Err(SessionError::Packet(error)) => {
                debug!(%error, "payload cannot be framed; not captured");
            }
        }
    }
}

impl<R: SocketResolver> PcapCaptureLogger<File, R> {
    /// Creates `<output_dir>/<prefix> <timestamp>.pcap` for a resolved PCAP
    /// configuration.
    pub fn open(resolved: &ResolvedCapture, resolver: R) -> Result<Self, CaptureError> {
        if resolved.capture_type != CaptureType::Pcap {
            return Err(CaptureError::ConfigurationMismatch {
                expected: resolved.capture_type,
                found: CaptureType::Pcap,
            });
        }

        let path = resolved.pcap_path_now();
        Self::create(&path, resolver, PcapOptions::from(resolved))
    }

    pub fn create(
        path: &Path,
        resolver: R,
        options: PcapOptions,
    ) -> Result<Self, CaptureError> {
        let file = File::create(path).map_err(|source| CaptureError::OpenSink {
            path: path.to_path_buf(),
            source,
        })?;
        let logger = Self::new(file, resolver, options)?;
        info!(
            path = %path.display(),
            mtu = options.policy.mtu(),
            "pcap capture opened"
        );
        Ok(logger)
    }
}

impl<W: RecordSink + Send, R: SocketResolver> NetworkCaptureLogger for PcapCaptureLogger<W, R> {
    fn log_ssl_read(&self, data: &[u8], socket: SocketId) {
        if self.options.dump_ssl_read {
            self.log_ssl(Direction::Inbound, data, socket);
        }
    }

    fn log_ssl_write(&self, data: &[u8], socket: SocketId) {
        if self.options.dump_ssl_write {
            self.log_ssl(Direction::Outbound, data, socket);
        }
    }

    fn log_read(&self, data: &[u8], socket: SocketId, from: Option<SocketAddr>) {
        self.log_socket(Direction::Inbound, data, socket, from);
    }

    fn log_write(&self, data: &[u8], socket: SocketId, to: Option<SocketAddr>) {
        self.log_socket(Direction::Outbound, data, socket, to);
    }

    fn capture_type(&self) -> CaptureType {
        CaptureType::Pcap
    }
}

impl<W: RecordSink + Send, R: SocketResolver> Drop for PcapCaptureLogger<W, R> {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = session.flush() {
            warn!(%error, "failed to flush capture file on close");
        }
        if session.take_writer().is_some() {
            info!(frames = session.frames(), "pcap capture closed");
        }
    }
}

impl<W: RecordSink + Send, R: SocketResolver> std::fmt::Debug for PcapCaptureLogger<W, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcapCaptureLogger")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum SkipReason {
    Resolve(ResolveError),
    NotIpv4(SocketAddr),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(error) => error.fmt(f),
            Self::NotIpv4(addr) => write!(f, "{addr} is not an IPv4 endpoint"),
        }
    }
}

impl From<ResolveError> for SkipReason {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}

fn ipv4(addr: SocketAddr) -> Result<SocketAddrV4, SkipReason> {
    match addr {
        SocketAddr::V4(addr) => Ok(addr),
        SocketAddr::V6(_) => Err(SkipReason::NotIpv4(addr)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Write};
    use std::net::SocketAddr;

    use sockcap_config::CaptureType;
    use sockcap_packet::{dissect, SegmentPolicy, Transport};
    use sockcap_pcap::{recover_records, RecordSink};

    use super::{PcapCaptureLogger, PcapOptions};
    use crate::logger::NetworkCaptureLogger;
    use crate::socket::{SocketId, StaticSocket, StaticSocketResolver};

    fn addr(text: &str) -> SocketAddr {
        text.parse().expect("valid socket address")
    }

    fn resolver() -> StaticSocketResolver {
        StaticSocketResolver::new()
            .with_socket(
                SocketId(10),
                StaticSocket::stream(addr("10.0.0.2:40000"), addr("93.184.216.34:443")),
            )
            .with_socket(
                SocketId(11),
                StaticSocket::stream(addr("[fd00::2]:40000"), addr("[fd00::1]:443")),
            )
    }

    fn frames(bytes: Vec<u8>) -> Vec<Vec<u8>> {
        recover_records(Cursor::new(bytes))
            .expect("recover")
            .records
            .into_iter()
            .map(|record| record.data.to_vec())
            .collect()
    }

    #[test]
    fn decrypted_read_flows_from_peer_to_local() {
        let logger =
            PcapCaptureLogger::new(Vec::new(), resolver(), PcapOptions::default()).expect("open");
        logger.log_ssl_read(b"HTTP/1.1 200 OK", SocketId(10));
        assert_eq!(logger.capture_type(), CaptureType::Pcap);

        let bytes = logger.finish().expect("finish").expect("active");
        let frames = frames(bytes);
        assert_eq!(frames.len(), 1);
        let frame = dissect(&frames[0]).expect("dissect");
        assert_eq!(frame.ipv4.source.to_string(), "93.184.216.34");
        assert_eq!(frame.ipv4.destination.to_string(), "10.0.0.2");
        match frame.transport {
            Transport::Tcp(tcp) => {
                assert_eq!(tcp.source_port, 443);
                assert_eq!(tcp.destination_port, 40000);
                assert_eq!(tcp.payload, b"HTTP/1.1 200 OK");
                assert!(tcp.checksum_valid);
            }
            other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    fn toggles_gate_each_decrypted_direction() {
        let options = PcapOptions {
            dump_ssl_read: false,
            ..PcapOptions::default()
        };
        let logger = PcapCaptureLogger::new(Vec::new(), resolver(), options).expect("open");
        logger.log_ssl_read(b"ignored", SocketId(10));
        logger.log_ssl_write(b"kept", SocketId(10));
        assert_eq!(logger.frames_written(), 1);
    }

    #[test]
    fn ipv6_and_unknown_sockets_are_skipped() {
        let logger =
            PcapCaptureLogger::new(Vec::new(), resolver(), PcapOptions::default()).expect("open");
        logger.log_ssl_write(b"v6", SocketId(11));
        logger.log_ssl_write(b"unknown", SocketId(99));
        logger.log_write(b"v6", SocketId(11), None);
        assert_eq!(logger.frames_written(), 0);
        assert!(logger.is_active());
    }

    #[test]
    fn empty_payload_emits_nothing() {
        let logger =
            PcapCaptureLogger::new(Vec::new(), resolver(), PcapOptions::default()).expect("open");
        logger.log_ssl_write(b"", SocketId(10));
        logger.log_write(b"", SocketId(10), None);
        assert_eq!(logger.frames_written(), 0);
    }

    #[test]
    fn small_mtu_splits_segments() {
        let options = PcapOptions {
            policy: SegmentPolicy::new(100).expect("mtu"),
            ..PcapOptions::default()
        };
        let logger = PcapCaptureLogger::new(Vec::new(), resolver(), options).expect("open");
        logger.log_write(&[7u8; 130], SocketId(10), None);
        assert_eq!(logger.frames_written(), 3);
    }

    /// Accepts the global header and a fixed number of records, then fails.
    struct FullDisk {
        bytes: Vec<u8>,
        remaining_writes: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining_writes == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }
            self.remaining_writes -= 1;
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl RecordSink for FullDisk {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.bytes.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn write_failure_degrades_session_without_surfacing() {
        let sink = FullDisk {
            bytes: Vec::new(),
            remaining_writes: 2,
        };
        let logger =
            PcapCaptureLogger::new(sink, resolver(), PcapOptions::default()).expect("open");
        logger.log_ssl_write(b"first", SocketId(10));
        assert!(logger.is_active());
        logger.log_ssl_write(b"second", SocketId(10));
        assert!(!logger.is_active());
        logger.log_ssl_write(b"third", SocketId(10));
        assert_eq!(logger.frames_written(), 1);
        assert!(logger.finish().expect("finish").is_none());
    }
}
