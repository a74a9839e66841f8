//! decode_hotpath.rs : micro-benchs « hot path » du décodeur disco
//!
//! Lancer :
//!   cargo bench -p disco-benches --bench decode_hotpath
//!   cargo bench -p disco-benches --bench decode_hotpath -- --save-baseline hot
//!   cargo bench -p disco-benches --bench decode_hotpath -- --baseline hot
//!
//! Données : unités synthétiques (`disco_benches::synthetic_unit`), tailles croissantes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use disco_benches::synthetic_unit;
use disco_core::{decode_instructions, decode_line_table, disassemble, find_jump_targets, Bytecode};

const SIZES: &[usize] = &[1, 16, 256];

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &blocks in SIZES {
        let unit = synthetic_unit(blocks);
        group.throughput(Throughput::Bytes(unit.code.len() as u64));
        group.bench_with_input(BenchmarkId::new("instructions", blocks), &unit, |b, unit| {
            b.iter(|| decode_instructions(black_box(unit)).filter(Result::is_ok).count());
        });
        group.bench_with_input(BenchmarkId::new("findlabels", blocks), &unit, |b, unit| {
            b.iter(|| find_jump_targets(black_box(&unit.code)).map(|t| t.len()));
        });
        group.bench_with_input(BenchmarkId::new("line_table", blocks), &unit, |b, unit| {
            b.iter(|| decode_line_table(unit.firstlineno, black_box(&unit.lnotab)).len());
        });
    }
    group.finish();
}

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing");
    for &blocks in SIZES {
        let unit = synthetic_unit(blocks);
        group.throughput(Throughput::Bytes(unit.code.len() as u64));
        group.bench_with_input(BenchmarkId::new("disassemble", blocks), &unit, |b, unit| {
            b.iter(|| disassemble(black_box(unit), None).map(|s| s.len()));
        });
        let view = Bytecode::new(unit);
        group.bench_with_input(BenchmarkId::new("bytecode_view", blocks), &view, |b, view| {
            b.iter(|| view.iter().count());
        });
    }
    group.finish();
}

fn bench_container(c: &mut Criterion) {
    let unit = synthetic_unit(256);
    let bytes = disco_unit::to_bytes(&unit).unwrap_or_default();
    let mut group = c.benchmark_group("container");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("to_bytes", |b| b.iter(|| disco_unit::to_bytes(black_box(&unit)).map(|v| v.len())));
    group.bench_function("from_bytes", |b| b.iter(|| disco_unit::from_bytes(black_box(&bytes)).map(|u| u.code.len())));
    group.finish();
}

criterion_group!(benches, bench_decode, bench_listing, bench_container);
criterion_main!(benches);
