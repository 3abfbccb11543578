//! Ring throughput benchmarks.
//!
//! Measures descriptor and frame transfer through the SPSC ring, single
//! threaded and across a producer/consumer thread pair.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use smartnic_agent::ring::{DescFlags, PacketDescriptor, PacketRing};

fn bench_descriptor_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor_roundtrip");

    for capacity in [64usize, 1024] {
        let (mut producer, mut consumer) = PacketRing::new(capacity, 2048).unwrap().split();
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("capacity", capacity), |b| {
            let mut seq = 0u64;
            b.iter(|| {
                producer.try_enqueue(PacketDescriptor::new(0, 64, seq, DescFlags::empty()));
                seq += 1;
                black_box(consumer.try_dequeue())
            })
        });
    }

    group.finish();
}

fn bench_frame_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_copy");

    for (name, size) in [("small", 64usize), ("mtu", 1500), ("jumbo", 9000)] {
        let (mut producer, mut consumer) = PacketRing::new(256, 9216).unwrap().split();
        let payload = vec![0xA5u8; size];
        let mut out = Vec::with_capacity(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("bytes", name), &payload, |b, payload| {
            b.iter(|| {
                producer.try_enqueue_frame(black_box(payload), DescFlags::empty()).unwrap();
                consumer.try_dequeue_frame(&mut out).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_zero_copy_peek(c: &mut Criterion) {
    let mut group = c.benchmark_group("zero_copy_peek");
    let (mut producer, mut consumer) = PacketRing::new(256, 2048).unwrap().split();
    let payload = vec![7u8; 1500];

    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("peek_1500", |b| {
        b.iter(|| {
            producer.try_enqueue_frame(&payload, DescFlags::NEEDS_INFERENCE).unwrap();
            let slot = consumer.peek().unwrap();
            black_box(slot.payload().len())
        })
    });

    group.finish();
}

fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_thread");
    const BATCH: u64 = 10_000;

    group.throughput(Throughput::Elements(BATCH));
    group.sample_size(20);
    group.bench_function("spsc_10k", |b| {
        b.iter(|| {
            let (mut producer, mut consumer) = PacketRing::new(1024, 64).unwrap().split();
            let handle = std::thread::spawn(move || {
                let mut seq = 0;
                while seq < BATCH {
                    if producer.try_enqueue(PacketDescriptor::new(0, 0, seq, DescFlags::empty())) {
                        seq += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            });
            let mut received = 0;
            while received < BATCH {
                if consumer.try_dequeue().is_some() {
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            handle.join().unwrap();
            black_box(received)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_descriptor_roundtrip,
    bench_frame_copy,
    bench_zero_copy_peek,
    bench_cross_thread
);
criterion_main!(benches);
