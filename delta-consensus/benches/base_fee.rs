use criterion::{criterion_group, criterion_main, Criterion};
use delta_consensus::{calc_base_fee, FeeWindow};
use delta_core::params::protocol::PHASE4_MIN_BASE_FEE;
use delta_core::{ChainConfig, Header};
use std::hint::black_box;

fn full_window_parent() -> Header {
    let mut window = FeeWindow::default();
    for slot in 0..10 {
        window.add(slot, 1_500_000);
    }
    Header {
        number: 100,
        time: 1_000,
        extra: window.to_bytes(),
        gas_used: 8_000_000,
        base_fee: Some(PHASE4_MIN_BASE_FEE * 2),
        ext_data_gas_used: Some(40_000),
        block_gas_cost: Some(100_000),
        ..Default::default()
    }
}

fn bench_calc_base_fee(c: &mut Criterion) {
    let config = ChainConfig::test_chain();
    let parent = full_window_parent();

    c.bench_function("calc_base_fee_full_window", |b| {
        b.iter(|| calc_base_fee(black_box(&config), black_box(&parent), black_box(1_002)))
    });

    c.bench_function("calc_base_fee_long_gap", |b| {
        b.iter(|| calc_base_fee(black_box(&config), black_box(&parent), black_box(1_100)))
    });
}

criterion_group!(benches, bench_calc_base_fee);
criterion_main!(benches);
