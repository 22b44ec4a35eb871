use std::net::{Ipv4Addr, SocketAddrV4};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sockcap_packet::{FlowEndpoints, FrameEncoder, TcpSegment};

fn bench_frame_encoding(criterion: &mut Criterion) {
    let encoder = FrameEncoder::default();
    let endpoints = FlowEndpoints::new(
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 2, 15), 49_152),
        SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 7), 443),
    );
    let mss = encoder.policy().max_segment_size();
    let payload = vec![0xA5u8; 64 * 1024];

    let mut group = criterion.benchmark_group("frame_encoding");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("tcp_segments_64k", |bench| {
        bench.iter(|| {
            let mut sequence = 0u32;
            for chunk in payload.chunks(mss) {
                let frame = encoder
                    .tcp_frame(
                        &TcpSegment {
                            endpoints,
                            sequence,
                            acknowledgement: 0,
                            payload: chunk,
                        },
                        0,
                    )
                    .expect("chunk fits in one segment");
                black_box(frame);
                sequence = sequence.wrapping_add(chunk.len() as u32);
            }
        });
    });
    group.bench_function("udp_fragments_60k", |bench| {
        bench.iter(|| {
            let frames = encoder
                .udp_frames(&endpoints, black_box(&payload[..60_000]), 1)
                .expect("datagram fits");
            black_box(frames);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_frame_encoding);
criterion_main!(benches);
