use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fmem_core::{BusMux, EngineConfig, H2F, H2F_LW};
use fmem_sim::LoopbackTransport;

fn loopback_mux() -> BusMux {
    BusMux::new(
        LoopbackTransport::new(H2F_LW.data_bytes()),
        LoopbackTransport::new(H2F.data_bytes()),
        EngineConfig::default(),
    )
}

fn bench_round_trip(c: &mut Criterion) {
    let mux = loopback_mux();
    let mut group = c.benchmark_group("transaction");

    for device in ["uart0", "ddr_cached"] {
        group.bench_with_input(BenchmarkId::new("read", device), device, |b, device| {
            b.iter(|| mux.read(black_box(device), black_box(0x40), 4).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("write", device), device, |b, device| {
            b.iter(|| {
                mux.write(black_box(device), black_box(0x40), 4, black_box(0xA5A5_5A5A))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_locate(c: &mut Criterion) {
    let mux = loopback_mux();
    c.bench_function("locate/ddr_cached", |b| {
        b.iter(|| mux.locate(black_box("ddr_cached")).unwrap())
    });
}

criterion_group!(benches, bench_round_trip, bench_locate);
criterion_main!(benches);
