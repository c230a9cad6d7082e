//! Criterion benchmarks for the signal-name parser and timestamp-regularity inference.
//!
//! These sit on the per-signal hot path of the ingestion pipeline: every signal dataset in
//! every file runs through `parse_signal_name` once, and every file's timestamp vector runs
//! through `infer_data_timestamps` once. Both are pure CPU work with no I/O, so they are worth
//! a baseline independent of the HDF5/RPC layers around them.
//!
//! Run with: cargo bench --bench signal_parser

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dp_h5_ingest::model::{infer_data_timestamps, Timestamp};
use dp_h5_ingest::signal_parser::{infer_signal_type, infer_units, parse_filename_metadata, parse_signal_name};

const WELL_FORMED_NAMES: &[&str] = &[
    "BPMS_DMPH_502_TMITBR",
    "KLYS_LI23_31_AMPL",
    "BPMS_LTUH_250_X",
    "BPMS_LTUH_250_Y",
    "TORO_IN20_111_TMIT",
    "PHAS_LI22_10_PHAS",
];

fn signal_name_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_signal_name");
    group.throughput(Throughput::Elements(WELL_FORMED_NAMES.len() as u64));

    group.bench_function("well_formed_batch", |b| {
        b.iter(|| {
            for name in WELL_FORMED_NAMES {
                black_box(parse_signal_name(name));
            }
        });
    });

    group.bench_function("unparsed_name", |b| {
        b.iter(|| {
            black_box(parse_signal_name("not a valid pv name"));
        });
    });

    group.finish();
}

fn units_and_type_inference(c: &mut Criterion) {
    c.bench_function("infer_units", |b| {
        b.iter(|| {
            black_box(infer_units("TMITBR"));
            black_box(infer_units("AMPL"));
            black_box(infer_units("UNKNOWN_SUFFIX"));
        });
    });

    c.bench_function("infer_signal_type", |b| {
        b.iter(|| {
            black_box(infer_signal_type("TMITBR"));
            black_box(infer_signal_type("AMPL"));
            black_box(infer_signal_type("UNKNOWN_SUFFIX"));
        });
    });
}

fn filename_metadata_parsing(c: &mut Criterion) {
    c.bench_function("parse_filename_metadata", |b| {
        b.iter(|| {
            black_box(parse_filename_metadata("BSA_LCLS_20231114_221320_LINAC"));
        });
    });
}

/// Mirrors a per-file timestamp vector at a handful of representative signal counts, so the
/// regularity scan's cost (capped at the first 10 adjacent differences regardless of length)
/// is visible as roughly flat past a few hundred samples.
fn timestamp_regularity_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("infer_data_timestamps");

    for &count in &[10usize, 1_000, 100_000] {
        let regular: Vec<Timestamp> = (0..count as u64).map(|i| Timestamp::new(1_700_000_000 + i, 0)).collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("regular", count), &regular, |b, ts| {
            b.iter(|| black_box(infer_data_timestamps(ts.clone())));
        });

        let mut irregular = regular.clone();
        if let Some(last) = irregular.last_mut() {
            *last = Timestamp::new(last.epoch_seconds + 5, 0);
        }
        group.bench_with_input(BenchmarkId::new("irregular_tail_gap", count), &irregular, |b, ts| {
            b.iter(|| black_box(infer_data_timestamps(ts.clone())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    signal_name_parsing,
    units_and_type_inference,
    filename_metadata_parsing,
    timestamp_regularity_inference
);
criterion_main!(benches);
