use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use pcap_file::pcap::{PcapHeader, PcapParser};
use pcap_file::Endianness;

use crate::PcapError;

/// Hard ceiling for a single record, independent of the declared snaplen.
pub const MAX_RECORD_BYTES: u32 = 256 * 1024;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcapRecord {
    /// Capture time since the Unix epoch.
    pub timestamp: Duration,
    pub original_len: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub header: PcapHeader,
    pub records: Vec<PcapRecord>,
    /// Set when the input ended inside a record.
    pub truncated_tail: bool,
}

/// Reads every complete record from `source`. A record cut short by end of
/// input stops the scan and is reported through `truncated_tail` instead of
/// failing.
pub fn recover_records<R: Read>(mut source: R) -> Result<RecoveryReport, PcapError> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    recover_slice(&bytes)
}

pub fn recover_slice(bytes: &[u8]) -> Result<RecoveryReport, PcapError> {
    if bytes.len() < GLOBAL_HEADER_LEN {
        return Err(PcapError::TruncatedGlobalHeader);
    }
    let (mut rest, parser) = PcapParser::new(bytes)?;
    let header = parser.header();
    let mut records = Vec::new();
    let mut truncated_tail = false;

    while !rest.is_empty() {
        if let Some(len) = declared_len(rest, header.endianness) {
            if len > MAX_RECORD_BYTES {
                return Err(PcapError::RecordTooLarge {
                    len: len as usize,
                    limit: MAX_RECORD_BYTES,
                });
            }
        }

        match parser.next_packet(rest) {
            Ok((remaining, packet)) => {
                records.push(PcapRecord {
                    timestamp: packet.timestamp,
                    original_len: packet.orig_len,
                    data: Bytes::copy_from_slice(&packet.data),
                });
                rest = remaining;
            }
            Err(pcap_file::PcapError::IncompleteBuffer) => {
                truncated_tail = true;
                break;
            }
            Err(error) => return Err(error.into()),
        }
    }

    Ok(RecoveryReport {
        header,
        records,
        truncated_tail,
    })
}

/// Captured length from a record header, when the whole header is present.
fn declared_len(record: &[u8], endianness: Endianness) -> Option<u32> {
    let field: [u8; 4] = record.get(8..RECORD_HEADER_LEN)?.try_into().ok()?;
    Some(match endianness {
        Endianness::Big => u32::from_be_bytes(field),
        Endianness::Little => u32::from_le_bytes(field),
    })
}
