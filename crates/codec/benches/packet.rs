use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

use skymesh_codec::{Endpoint, PACKET_SIZE, Packet, PacketKind};

fn criterion_benchmark(c: &mut Criterion) {
    let mut packet = Packet::new(
        Endpoint::new("192.168.1.10".parse().unwrap(), 4000),
        Endpoint::new("10.20.30.40".parse().unwrap(), 4001),
        PacketKind::File,
        &[0x5A; 32 * 1024],
    )
    .unwrap();
    packet.seal();

    let mut bytes = BytesMut::with_capacity(PACKET_SIZE);
    packet.encode(&mut bytes);

    let mut packet_criterion = c.benchmark_group("packet");

    packet_criterion.throughput(Throughput::Bytes(PACKET_SIZE as u64));
    packet_criterion.bench_function("encode", |bencher| {
        bencher.iter(|| {
            packet.encode(&mut bytes);
        })
    });

    packet_criterion.bench_function("decode_and_verify", |bencher| {
        bencher.iter(|| {
            Packet::decode(&bytes).unwrap().verify();
        })
    });

    packet_criterion.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
