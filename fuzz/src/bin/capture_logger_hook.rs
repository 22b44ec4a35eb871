use std::io::{self, Cursor, Read};
use std::net::SocketAddr;

use sockcap_capture::{
    NetworkCaptureLogger, PcapCaptureLogger, PcapOptions, SocketId, StaticSocket,
    StaticSocketResolver,
};
use sockcap_packet::{dissect, SegmentPolicy, Transport};
use sockcap_pcap::recover_records;

fn main() {
    let mut data = Vec::new();
    let _ = io::stdin().read_to_end(&mut data);
    if data.len() < 3 {
        return;
    }

    let mtu = usize::from(u16::from_le_bytes([data[0], data[1]]));
    let Ok(policy) = SegmentPolicy::new(mtu) else {
        return;
    };
    let selector = data[2];
    let payload = &data[3..];

    let local: SocketAddr = ([10, 0, 2, 15], 49152).into();
    let peer: SocketAddr = ([192, 0, 2, 1], 443).into();
    let entry = if selector & 1 == 0 {
        StaticSocket::stream(local, peer)
    } else {
        StaticSocket::datagram(local, Some(peer))
    };
    let resolver = StaticSocketResolver::new().with_socket(SocketId(3), entry);
    let options = PcapOptions {
        policy,
        ..PcapOptions::default()
    };
    let Ok(logger) = PcapCaptureLogger::new(Vec::new(), resolver, options) else {
        return;
    };

    match (selector >> 1) & 3 {
        0 => logger.log_write(payload, SocketId(3), None),
        1 => logger.log_read(payload, SocketId(3), None),
        2 => logger.log_ssl_write(payload, SocketId(3)),
        _ => logger.log_ssl_read(payload, SocketId(3)),
    }

    let Ok(Some(bytes)) = logger.finish() else {
        return;
    };
    let Ok(report) = recover_records(Cursor::new(bytes)) else {
        panic!("logger produced an unreadable capture");
    };
    assert!(!report.truncated_tail);
    for record in &report.records {
        assert_eq!(record.original_len as usize, record.data.len());
        let frame = dissect(&record.data).expect("synthetic frame must dissect");
        assert!(frame.ipv4.header_checksum_valid);
        assert!(usize::from(frame.ipv4.total_len) <= policy.mtu());
        if let Transport::Tcp(tcp) = frame.transport {
            assert!(tcp.checksum_valid);
        }
    }
}
