use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pcap_file::pcap::{PcapHeader, PcapPacket};
use pcap_file::{DataLink, Endianness, TsResolution};

use crate::sink::{RecordSink, StagedSink};
use crate::PcapError;

pub const DEFAULT_SNAPLEN: u32 = 65_535;

/// Little-endian, microsecond-resolution Ethernet header used for every
/// capture this crate writes.
#[must_use]
pub fn ethernet_header() -> PcapHeader {
    PcapHeader {
        version_major: 2,
        version_minor: 4,
        ts_correction: 0,
        ts_accuracy: 0,
        snaplen: DEFAULT_SNAPLEN,
        datalink: DataLink::ETHERNET,
        ts_resolution: TsResolution::MicroSecond,
        endianness: Endianness::Little,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCommit {
    pub index: u64,
    pub len: u32,
    /// File offset just past this record.
    pub end_offset: u64,
}

/// Append-only pcap writer with record-boundary commits.
///
/// `pcap_file` encodes each record into a staging buffer which is then handed
/// to the sink with one `write_all` and flushed. When that fails the sink is
/// cut back to the end of the last committed record and the writer refuses
/// further appends, so the container never ends in a partial record.
pub struct PcapWriter<W: RecordSink> {
    inner: pcap_file::pcap::PcapWriter<StagedSink<W>>,
    header: PcapHeader,
    records: u64,
    closed: bool,
}

impl<W: RecordSink> PcapWriter<W> {
    pub fn new(sink: W, header: PcapHeader) -> Result<Self, PcapError> {
        let mut inner = pcap_file::pcap::PcapWriter::with_header(StagedSink::new(sink), header)?;
        inner.get_mut().commit()?;
        Ok(Self {
            inner,
            header,
            records: 0,
            closed: false,
        })
    }

    #[must_use]
    pub const fn header(&self) -> &PcapHeader {
        &self.header
    }

    #[must_use]
    pub const fn records(&self) -> u64 {
        self.records
    }

    #[must_use]
    pub fn committed_len(&self) -> u64 {
        self.inner.get_ref().committed_len()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn append(&mut self, timestamp: SystemTime, frame: &[u8]) -> Result<RecordCommit, PcapError> {
        let since_epoch = timestamp
            .duration_since(UNIX_EPOCH)
            .map_err(|_| PcapError::TimestampOutOfRange)?;
        self.append_at(since_epoch, frame)
    }

    /// Appends one record stamped `since_epoch`. Frames longer than the
    /// snapshot length are rejected rather than stored cut short.
    pub fn append_at(
        &mut self,
        since_epoch: Duration,
        frame: &[u8],
    ) -> Result<RecordCommit, PcapError> {
        if self.closed {
            return Err(PcapError::Closed);
        }
        if u32::try_from(since_epoch.as_secs()).is_err() {
            return Err(PcapError::TimestampOutOfRange);
        }
        let len = u32::try_from(frame.len())
            .ok()
            .filter(|len| *len <= self.header.snaplen)
            .ok_or(PcapError::RecordTooLarge {
                len: frame.len(),
                limit: self.header.snaplen,
            })?;

        if let Err(error) = self
            .inner
            .write_packet(&PcapPacket::new(since_epoch, len, frame))
        {
            self.inner.get_mut().discard();
            return Err(error.into());
        }
        let end_offset = match self.inner.get_mut().commit() {
            Ok(end_offset) => end_offset,
            Err(error) => {
                self.closed = true;
                return Err(PcapError::Io(error));
            }
        };

        let commit = RecordCommit {
            index: self.records,
            len,
            end_offset,
        };
        self.records += 1;
        Ok(commit)
    }

    pub fn flush(&mut self) -> Result<(), PcapError> {
        std::io::Write::flush(self.inner.get_mut()).map_err(PcapError::Io)
    }

    pub fn into_inner(mut self) -> Result<W, PcapError> {
        self.flush()?;
        Ok(self.inner.into_writer().into_inner())
    }
}

impl<W: RecordSink> fmt::Debug for PcapWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcapWriter")
            .field("header", &self.header)
            .field("committed_len", &self.committed_len())
            .field("records", &self.records)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
