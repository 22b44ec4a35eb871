use std::io::{self, Read};

use sockcap_packet::{dissect, Transport};

fn main() {
    let mut data = Vec::new();
    let _ = io::stdin().read_to_end(&mut data);

    let Ok(frame) = dissect(&data) else {
        return;
    };
    let payload_len = match frame.transport {
        Transport::Tcp(tcp) => tcp.payload.len(),
        Transport::Udp(udp) => udp.payload.len(),
        Transport::Fragment(body) => body.len(),
        Transport::Other { payload, .. } => payload.len(),
    };
    assert!(payload_len <= data.len());
}
