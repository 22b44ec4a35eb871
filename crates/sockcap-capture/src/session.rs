use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::time::{Duration, SystemTime};

use sockcap_packet::{FlowEndpoints, FrameEncoder, PacketError, SegmentPolicy, TcpSegment};
use sockcap_pcap::{PcapError, PcapWriter, RecordSink};
use tracing::{debug, trace, warn};

/// Minimum time between idle sweeps of the stream table.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

use crate::socket::SocketId;

/// Which way the logged bytes travelled relative to the local socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Peer to local.
    Inbound,
    /// Local to peer.
    Outbound,
}

/// Identity of one synthetic TCP stream.
///
/// Keying on the endpoints as well as the descriptor means a descriptor reused
/// for a new connection starts again at sequence zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub socket: SocketId,
    pub local: SocketAddrV4,
    pub peer: SocketAddrV4,
}

impl StreamKey {
    #[must_use]
    pub const fn new(socket: SocketId, local: SocketAddrV4, peer: SocketAddrV4) -> Self {
        Self {
            socket,
            local,
            peer,
        }
    }

    #[must_use]
    pub const fn endpoints(&self, direction: Direction) -> FlowEndpoints {
        match direction {
            Direction::Inbound => FlowEndpoints::new(self.peer, self.local),
            Direction::Outbound => FlowEndpoints::new(self.local, self.peer),
        }
    }
}

/// Byte counters for both directions of one stream, modulo 2^32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceState {
    pub outbound: u32,
    pub inbound: u32,
}

impl SequenceState {
    /// `(sequence, acknowledgement)` for the next segment in `direction`.
    #[must_use]
    pub const fn numbers(&self, direction: Direction) -> (u32, u32) {
        match direction {
            Direction::Inbound => (self.inbound, self.outbound),
            Direction::Outbound => (self.outbound, self.inbound),
        }
    }

    pub fn advance(&mut self, direction: Direction, len: usize) {
        // Wrapping: sequence space is modulo 2^32 and `len as u32` keeps the low bits.
        let len = len as u32;
        match direction {
            Direction::Inbound => self.inbound = self.inbound.wrapping_add(len),
            Direction::Outbound => self.outbound = self.outbound.wrapping_add(len),
        }
    }
}

/// Bounds on the per-stream sequence table.
///
/// Loggers never see sockets close, so streams are forgotten once idle or
/// once the table is full. A forgotten stream that becomes active again
/// restarts at sequence zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Streams tracked at once; the least recently seen go first beyond this.
    pub max_streams: usize,
    /// Streams not logged on for this long are dropped at the next sweep.
    pub idle_timeout: Duration,
}

impl StreamLimits {
    pub const DEFAULT_MAX_STREAMS: usize = 4096;
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_streams: Self::DEFAULT_MAX_STREAMS,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedStream {
    sequence: SequenceState,
    last_seen: SystemTime,
}

/// Mutable state behind one synthetic-packet logger.
#[derive(Debug)]
pub(crate) struct CaptureSession<W: RecordSink> {
    writer: Option<PcapWriter<W>>,
    encoder: FrameEncoder,
    streams: HashMap<StreamKey, TrackedStream>,
    limits: StreamLimits,
    last_sweep: Option<SystemTime>,
    identification: u16,
    frames: u64,
}

impl<W: RecordSink> CaptureSession<W> {
    pub(crate) fn new(writer: PcapWriter<W>, policy: SegmentPolicy, limits: StreamLimits) -> Self {
        Self {
            writer: Some(writer),
            encoder: FrameEncoder::new(policy),
            streams: HashMap::new(),
            limits,
            last_sweep: None,
            identification: 0,
            frames: 0,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.writer
            .as_ref()
            .is_some_and(|writer| !writer.is_closed())
    }

    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    pub(crate) fn sequence(&self, key: &StreamKey) -> Option<SequenceState> {
        self.streams.get(key).map(|stream| stream.sequence)
    }

    pub(crate) fn tracked_streams(&self) -> usize {
        self.streams.len()
    }

    /// Drops idle streams every [`SWEEP_INTERVAL`], and the least recently
    /// seen ones when `incoming` would not fit.
    fn prune(&mut self, incoming: &StreamKey, now: SystemTime) {
        let full = !self.streams.contains_key(incoming)
            && self.streams.len() >= self.limits.max_streams;
        let last_sweep = *self.last_sweep.get_or_insert(now);
        if !full && elapsed(last_sweep, now) < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Some(now);

        let before = self.streams.len();
        let idle_timeout = self.limits.idle_timeout;
        self.streams
            .retain(|_, stream| elapsed(stream.last_seen, now) < idle_timeout);

        if !self.streams.contains_key(incoming) {
            let room = self.limits.max_streams.saturating_sub(1);
            while self.streams.len() > room {
                let Some(oldest) = self
                    .streams
                    .iter()
                    .min_by_key(|(_, stream)| stream.last_seen)
                    .map(|(key, _)| *key)
                else {
                    break;
                };
                self.streams.remove(&oldest);
            }
        }

        let evicted = before - self.streams.len();
        if evicted > 0 {
            debug!(
                evicted,
                tracked = self.streams.len(),
                "stale streams forgotten"
            );
        }
    }

    /// Emits `payload` as consecutive MSS-sized segments on `key`.
    pub(crate) fn emit_tcp(
        &mut self,
        key: StreamKey,
        direction: Direction,
        payload: &[u8],
        now: SystemTime,
    ) -> Result<(), SessionError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let endpoints = key.endpoints(direction);
        self.prune(&key, now);
        let stream = self.streams.entry(key).or_insert(TrackedStream {
            sequence: SequenceState::default(),
            last_seen: now,
        });
        stream.last_seen = now;
        let state = &mut stream.sequence;

        for chunk in self.encoder.policy().segments(payload) {
            let (sequence, acknowledgement) = state.numbers(direction);
            let identification = self.identification;
            self.identification = self.identification.wrapping_add(1);

            let frame = self.encoder.tcp_frame(
                &TcpSegment {
                    endpoints,
                    sequence,
                    acknowledgement,
                    payload: chunk,
                },
                identification,
            )?;
            writer.append(now, &frame)?;
            state.advance(direction, chunk.len());
            self.frames += 1;
            trace!(
                socket = %key.socket,
                ?direction,
                sequence,
                acknowledgement,
                len = chunk.len(),
                "tcp segment captured"
            );
        }

        Ok(())
    }

    /// Emits one UDP datagram, fragmented when it exceeds the MTU.
    pub(crate) fn emit_udp(
        &mut self,
        endpoints: FlowEndpoints,
        payload: &[u8],
        now: SystemTime,
    ) -> Result<(), SessionError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let identification = self.identification;
        self.identification = self.identification.wrapping_add(1);

        let frames = self
            .encoder
            .udp_frames(&endpoints, payload, identification)?;
        for frame in &frames {
            writer.append(now, frame)?;
            self.frames += 1;
        }
        trace!(
            source = %endpoints.source,
            destination = %endpoints.destination,
            len = payload.len(),
            fragments = frames.len(),
            "udp datagram captured"
        );

        Ok(())
    }

    /// Stops capturing after a write failure. The writer has already cut the
    /// sink back to the last committed record.
    pub(crate) fn degrade(&mut self, error: &PcapError) {
        if let Some(writer) = self.writer.as_ref() {
            warn!(
                %error,
                committed_bytes = writer.committed_len(),
                records = writer.records(),
                "capture file write failed; capture disabled for this session"
            );
        }
        self.writer = None;
    }

    pub(crate) fn take_writer(&mut self) -> Option<PcapWriter<W>> {
        self.writer.take()
    }

    pub(crate) fn flush(&mut self) -> Result<(), PcapError> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

fn elapsed(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or_default()
}

#[derive(Debug)]
pub(crate) enum SessionError {
    Packet(PacketError),
    Pcap(PcapError),
}

impl From<PacketError> for SessionError {
    fn from(value: PacketError) -> Self {
        Self::Packet(value)
    }
}

impl From<PcapError> for SessionError {
    fn from(value: PcapError) -> Self {
        Self::Pcap(value)
    }
}
