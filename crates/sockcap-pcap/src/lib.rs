mod error;
pub mod reader;
pub mod sink;
pub mod writer;

pub use error::PcapError;
pub use pcap_file::pcap::PcapHeader;
pub use reader::{recover_records, recover_slice, PcapRecord, RecoveryReport, MAX_RECORD_BYTES};
pub use sink::RecordSink;
pub use writer::{ethernet_header, PcapWriter, RecordCommit, DEFAULT_SNAPLEN};
