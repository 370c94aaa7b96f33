//! Benchmarks for the receive and transmit paths
//!
//! Measures:
//! - Reassembly of a CAN capture fed in link-sized and byte-sized chunks
//! - Decoding of reassembled frames
//! - Encoding of classic and FD CAN messages

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use protocol::{
    CanMessage, Decoder, Encoder, EncoderConfig, FramingConfig, MAX_LINK_PAYLOAD, Message, NetId,
    Packetizer,
};

fn can_stream(frames: usize) -> Vec<u8> {
    let encoder = Encoder::default();
    (0..frames)
        .flat_map(|i| {
            let msg = Message::Can(CanMessage::new(
                NetId::HsCan,
                0x100 + (i as u32 % 0x400),
                vec![i as u8; 8],
            ));
            encoder.encode(&msg).unwrap()
        })
        .collect()
}

fn benchmark_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");
    let stream = can_stream(1000);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk in [1usize, 64, MAX_LINK_PAYLOAD] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, chunk| {
            b.iter(|| {
                let mut packetizer = Packetizer::new(FramingConfig::default());
                let mut count = 0;
                for piece in stream.chunks(*chunk) {
                    packetizer.input(black_box(piece));
                    count += packetizer.output().count();
                }
                count
            })
        });
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let mut packetizer = Packetizer::new(FramingConfig::default());
    packetizer.input(&can_stream(1000));
    let packets: Vec<_> = packetizer.output().collect();
    let decoder = Decoder::default();

    group.throughput(Throughput::Elements(packets.len() as u64));
    group.bench_function("can_classic_1000", |b| {
        b.iter(|| {
            packets
                .iter()
                .filter(|p| decoder.decode(black_box(p)).is_ok())
                .count()
        })
    });

    group.finish();
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let classic = Message::Can(CanMessage::new(NetId::HsCan, 0x7DF, vec![0x02, 0x01, 0x0C]));
    let encoder = Encoder::default();
    group.bench_function("can_classic", |b| {
        b.iter(|| encoder.encode(black_box(&classic)))
    });

    let mut fd = CanMessage::new(NetId::HsCan, 0x18DA_F110, vec![0xAB; 64]);
    fd.fd = true;
    fd.extended = true;
    let fd = Message::Can(fd);
    let fd_encoder = Encoder::new(
        FramingConfig::default(),
        EncoderConfig {
            support_canfd: true,
            ..EncoderConfig::default()
        },
    );
    group.throughput(Throughput::Bytes(64));
    group.bench_function("can_fd_64bytes", |b| {
        b.iter(|| fd_encoder.encode(black_box(&fd)))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_reassembly,
    benchmark_decode,
    benchmark_encode
);
criterion_main!(benches);
