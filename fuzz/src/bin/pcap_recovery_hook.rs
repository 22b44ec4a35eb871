use std::io::{self, Cursor, Read};

use sockcap_pcap::recover_records;

fn main() {
    let mut data = Vec::new();
    let _ = io::stdin().read_to_end(&mut data);

    let Ok(report) = recover_records(Cursor::new(&data)) else {
        return;
    };
    let consumed: usize = report
        .records
        .iter()
        .map(|record| 16 + record.data.len())
        .sum();
    assert!(24 + consumed <= data.len());
}
