//! Codec benchmarks for beacon-protocol.

use beacon_protocol::{codec, Frame, PartialSpaceUser, SpaceEvent, SpaceUser};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn add_user_frame() -> Frame {
    let mut user = SpaceUser::new(42, "Benchmark User");
    user.uuid = "7a1d8f52-2f43-4d7e-9f5e-000000000042".to_string();
    user.tags = vec!["member".to_string(), "admin".to_string()];
    user.play_uri = "/_/global/maps.example.org/office.tmj".to_string();
    Frame::space(SpaceEvent::add_user("office:lobby", user).with_filter("everybody"))
}

fn bench_encode_add(c: &mut Criterion) {
    let frame = add_user_frame();
    let size = codec::encode(&frame).unwrap().len();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("add_user", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_decode_add(c: &mut Criterion) {
    let encoded = codec::encode(&add_user_frame()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("add_user", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_partial_update(c: &mut Criterion) {
    let frame = Frame::space(SpaceEvent::update_user(
        "office:lobby",
        PartialSpaceUser::new(42).with_megaphone(true),
    ));

    c.bench_function("update_user_encode_decode", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode_add, bench_decode_add, bench_partial_update);
criterion_main!(benches);
