//! End-to-end tests driving the ingestion pipeline through real H5 fixture files: scanner →
//! HDF5 reader → signal-name parser → request builder.
//!
//! These exercise the scenarios from `spec.md` §8 that don't require a live DP server (no RPC
//! is involved — `IngestRecord` construction is the last step asserted on).
//!
//! # Running
//!
//! ```bash
//! cargo test --test h5_ingestion_pipeline --features storage_hdf5
//! ```
//!
//! Requires the HDF5 C library to be installed (`libhdf5-dev` / `brew install hdf5`); these
//! tests are compiled out entirely without the `storage_hdf5` feature.

#![cfg(feature = "storage_hdf5")]

use dp_h5_ingest::hdf5_reader::read_file;
use dp_h5_ingest::request_builder::build_ingest_record;
use dp_h5_ingest::scanner::{filter_unprocessed, scan_h5_files};
use dp_h5_ingest::model::ProcessedFileCache;
use tempfile::TempDir;

fn write_fixture(dir: &std::path::Path, filename: &str, seconds: &[u64], signal_name: &str, values: &[f64]) {
    let path = dir.join(filename);
    let file = hdf5::File::create(&path).expect("create h5 fixture");
    file.new_dataset::<u64>()
        .create("secondsPastEpoch", seconds.len())
        .expect("create secondsPastEpoch")
        .write(seconds)
        .expect("write secondsPastEpoch");
    file.new_dataset::<f64>()
        .create(signal_name, values.len())
        .expect("create signal dataset")
        .write(values)
        .expect("write signal dataset");
}

/// Scenario 1 from `spec.md` §8: a one-file directory with a regular two-sample clock and a
/// signal carrying a NaN.
#[test]
fn happy_path_emits_record_with_nan_preserved() {
    let dir = TempDir::new().expect("tempdir");
    write_fixture(
        dir.path(),
        "BSA_LCLS_20231114_221320.h5",
        &[1_700_000_000, 1_700_000_001],
        "BPMS_DMPH_502_TMITBR",
        &[1.5, f64::NAN],
    );

    let files = scan_h5_files(dir.path()).expect("scan");
    assert_eq!(files.len(), 1);

    let contents = read_file(&files[0], 1000).expect("read fixture");
    assert_eq!(contents.signals.len(), 1);

    let signal = &contents.signals[0];
    assert_eq!(signal.info.full_name, "BPMS_DMPH_502_TMITBR");
    assert_eq!(signal.values.len(), 2);
    assert!(signal.values[1].is_nan());

    let record = build_ingest_record("provider-1", signal, &files[0].to_string_lossy(), 1_700_000_000);
    assert_eq!(record.column.len(), 2);
    assert_eq!(record.attributes.get("valid_samples"), Some(&"1".to_string()));
    assert_eq!(record.attributes.get("nan_samples"), Some(&"1".to_string()));
    assert!(record.tags.contains("contains_nan"));
    assert!(record.tags.contains("h5_data"));
    assert!(record.tags.contains("accelerator_data"));

    let cache = ProcessedFileCache::open(dir.path()).expect("open cache");
    cache.mark_processed(&files[0]).expect("mark processed");
    assert!(cache.is_processed(&files[0]));
}

/// Scenario 3 from `spec.md` §8: one of three files has no `secondsPastEpoch` dataset and must
/// fail independently, without affecting the other two.
#[test]
fn partial_failure_is_confined_to_one_file() {
    let dir = TempDir::new().expect("tempdir");
    write_fixture(dir.path(), "a.h5", &[1_700_000_000, 1_700_000_001], "SIG_A", &[1.0, 2.0]);
    write_fixture(dir.path(), "c.h5", &[1_700_000_000, 1_700_000_001], "SIG_C", &[3.0, 4.0]);

    // file 2 has no secondsPastEpoch dataset at all
    let bad_path = dir.path().join("b.h5");
    let bad_file = hdf5::File::create(&bad_path).expect("create bad fixture");
    bad_file
        .new_dataset::<f64>()
        .create("SIG_B", 2)
        .expect("create signal dataset")
        .write(&[5.0, 6.0])
        .expect("write signal dataset");
    drop(bad_file);

    let files = scan_h5_files(dir.path()).expect("scan");
    assert_eq!(files.len(), 3);

    let mut processed = 0;
    let mut failed = 0;
    for path in &files {
        match read_file(path, 1000) {
            Ok(_) => processed += 1,
            Err(_) => failed += 1,
        }
    }
    assert_eq!(processed, 2);
    assert_eq!(failed, 1);
}

/// Scenario 4 from `spec.md` §8: `--resume` must skip files already recorded in the cache.
#[test]
fn resume_skips_already_processed_files() {
    let dir = TempDir::new().expect("tempdir");
    write_fixture(dir.path(), "a.h5", &[1_700_000_000, 1_700_000_001], "SIG_A", &[1.0, 2.0]);
    write_fixture(dir.path(), "b.h5", &[1_700_000_000, 1_700_000_001], "SIG_B", &[3.0, 4.0]);

    let cache = ProcessedFileCache::open(dir.path()).expect("open cache");
    let files = scan_h5_files(dir.path()).expect("scan");
    let a_path = files.iter().find(|p| p.ends_with("a.h5")).expect("a.h5 present").clone();
    cache.mark_processed(&a_path).expect("mark a processed");

    let remaining = filter_unprocessed(files, &cache);
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].ends_with("b.h5"));
}

/// Scenario 5 from `spec.md` §8: an irregular gap must surface as a `TimestampList`, not a
/// `SamplingClock`, while still reporting the correct sample count.
#[test]
fn irregular_sampling_yields_timestamp_list() {
    use dp_h5_ingest::model::DataTimestamps;

    let dir = TempDir::new().expect("tempdir");
    write_fixture(
        dir.path(),
        "BSA_LCLS_20231114_221320.h5",
        &[1_700_000_000, 1_700_000_001, 1_700_000_003],
        "BPMS_DMPH_502_X",
        &[1.0, 2.0, 3.0],
    );

    let files = scan_h5_files(dir.path()).expect("scan");
    let contents = read_file(&files[0], 1000).expect("read fixture");

    match contents.timestamps.as_ref() {
        DataTimestamps::List(list) => assert_eq!(list.len(), 3),
        DataTimestamps::Clock(_) => panic!("expected an irregular timestamp list"),
    }

    let signal = &contents.signals[0];
    let record = build_ingest_record("provider-1", signal, &files[0].to_string_lossy(), 1_700_000_000);
    assert_eq!(record.attributes.get("sample_count"), Some(&"3".to_string()));
}

/// A file whose size falls below the minimum accepted threshold must be rejected outright
/// (`spec.md` §4.B step 1), independent of its dataset contents.
#[test]
fn undersized_file_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("tiny.h5");
    std::fs::write(&path, b"not a real h5 file").expect("write tiny file");
    assert!(read_file(&path, 1000).is_err());
}
