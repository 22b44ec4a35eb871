use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcapError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pcap container: {0}")]
    Format(#[from] pcap_file::PcapError),

    #[error("truncated pcap global header")]
    TruncatedGlobalHeader,

    #[error("record length {len} exceeds the {limit}-byte limit")]
    RecordTooLarge { len: usize, limit: u32 },

    #[error("timestamp is outside the 32-bit pcap range")]
    TimestampOutOfRange,

    #[error("writer is closed after a failed append")]
    Closed,
}
