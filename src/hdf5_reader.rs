//! HDF5 file reading, serialized behind a single process-wide lock (`spec.md` §4.B).
//!
//! The HDF5 C library is not reentrant: every call into it — open, group traversal, dataset
//! read, close — must happen while [`HDF5_LOCK`] is held. All concurrency in this pipeline
//! exists *around* this module, never inside it (`spec.md` §9).

use std::path::Path;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::warn;

use crate::error::{IngestError, Result};
use crate::model::{infer_data_timestamps, DataTimestamps, Signal, SignalFileMetadata, Timestamp};
use crate::signal_parser::parse_signal_name;

/// The process-global lock serializing every call into the HDF5 library.
pub static HDF5_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Minimum accepted file size, below which a file is rejected outright (`spec.md` §4.B).
pub const MIN_FILE_SIZE_BYTES: u64 = 1024;
/// Maximum accepted file size (`spec.md` §4.B).
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024 * 1024;
/// Maximum accepted timestamp count (`spec.md` §4.B).
pub const MAX_TIMESTAMP_COUNT: usize = 10_000_000;

/// File-access cache tuning mirroring `H5::FileAccPropList::setCache(521, 75, 4MiB, 0.75)`
/// (`SPEC_FULL.md` §4.B): fixed constants, not user-configurable.
const FAPL_NUM_SLOTS: usize = 521;
const FAPL_NUM_ELEMENTS: usize = 75;
const FAPL_BYTE_SIZE: usize = 4 * 1024 * 1024;
const FAPL_PREEMPTION_POLICY: f64 = 0.75;

/// Tolerance used when matching a dataset axis length to the timestamp count (`spec.md` §3,
/// §4.B): within ±1%.
const AXIS_MATCH_TOLERANCE: f64 = 0.01;

/// One signal dataset read from a file, before name parsing is attached.
struct RawSignal {
    name: String,
    values: Vec<f64>,
    matlab_class: Option<String>,
    label: Option<String>,
}

/// A fully-opened and read H5 file: its timestamps and every signal dataset found in the root
/// group (apart from the two timestamp datasets).
pub struct FileContents {
    /// Shared timestamps for every signal in the file.
    pub timestamps: Arc<DataTimestamps>,
    /// Signals read from the file, in HDF5 root-group enumeration order.
    pub signals: Vec<Signal>,
}

/// Reads an entire H5 file: validates its size, opens it, extracts timestamps, and reads every
/// signal dataset in the root group.
///
/// The whole operation — including every dataset read — happens while [`HDF5_LOCK`] is held;
/// the lock is released via RAII as soon as this function returns, even on error (`spec.md`
/// §4.B, §9).
///
/// # Errors
/// Returns [`IngestError::FileOpen`] for size or open failures, [`IngestError::MissingTimestamps`]
/// if `secondsPastEpoch` is absent or out of range, and [`IngestError::TooManySignals`] if the
/// root group has more signal datasets than `max_signals`.
#[cfg(feature = "storage_hdf5")]
pub fn read_file(path: &Path, max_signals: usize) -> Result<FileContents> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() < MIN_FILE_SIZE_BYTES || metadata.len() > MAX_FILE_SIZE_BYTES {
        return Err(IngestError::FileOpen {
            path: path.to_path_buf(),
            reason: format!("size {} bytes outside accepted range", metadata.len()),
        });
    }

    let _guard = HDF5_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    let fapl = hdf5::file::FileAccessBuilder::new()
        .chunk_cache(FAPL_NUM_SLOTS, FAPL_NUM_ELEMENTS, FAPL_BYTE_SIZE, FAPL_PREEMPTION_POLICY)
        .finish()
        .map_err(|e| IngestError::Hdf5(e.to_string()))?;
    let file = hdf5::File::open_with_fapl(path, &fapl)
        .or_else(|_| hdf5::File::open(path))
        .map_err(|e| IngestError::FileOpen { path: path.to_path_buf(), reason: e.to_string() })?;

    let timestamps = extract_timestamps(&file, path)?;
    let raw_signals = read_signal_datasets(&file, path, timestamps.len(), max_signals)?;

    let file_stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let file_metadata = crate::signal_parser::parse_filename_metadata(file_stem);

    let shared_timestamps = timestamps.shared();
    let signals = raw_signals
        .into_iter()
        .map(|raw| {
            let mut info = parse_signal_name(&raw.name);
            info.matlab_class = raw.matlab_class;
            info.label = raw.label;
            Signal {
                info,
                file_metadata: file_metadata.clone(),
                timestamps: Arc::clone(&shared_timestamps),
                values: raw.values,
            }
        })
        .collect();

    Ok(FileContents { timestamps: shared_timestamps, signals })
}

#[cfg(feature = "storage_hdf5")]
fn extract_timestamps(file: &hdf5::File, path: &Path) -> Result<DataTimestamps> {
    let seconds_ds = file.dataset("secondsPastEpoch").map_err(|_| IngestError::MissingTimestamps {
        path: path.to_path_buf(),
        reason: "no secondsPastEpoch dataset".to_string(),
    })?;
    let seconds: Vec<u64> = seconds_ds.read_raw().map_err(|e| IngestError::MissingTimestamps {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if seconds.is_empty() || seconds.len() > MAX_TIMESTAMP_COUNT {
        return Err(IngestError::MissingTimestamps {
            path: path.to_path_buf(),
            reason: format!("timestamp count {} out of range", seconds.len()),
        });
    }

    let nanoseconds: Vec<u64> = match file.dataset("nanoseconds") {
        Ok(ds) => {
            let nanos: Vec<u64> =
                ds.read_raw().map_err(|e| IngestError::MissingTimestamps {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            if nanos.len() != seconds.len() {
                return Err(IngestError::MissingTimestamps {
                    path: path.to_path_buf(),
                    reason: "nanoseconds/secondsPastEpoch length mismatch".to_string(),
                });
            }
            nanos
        }
        Err(_) => vec![0; seconds.len()],
    };

    let timestamps: Vec<Timestamp> = seconds
        .into_iter()
        .zip(nanoseconds)
        .map(|(s, n)| Timestamp::new(s, n))
        .collect();

    Ok(infer_data_timestamps(timestamps))
}

#[cfg(feature = "storage_hdf5")]
fn read_signal_datasets(
    file: &hdf5::File,
    path: &Path,
    timestamp_count: usize,
    max_signals: usize,
) -> Result<Vec<RawSignal>> {
    let member_names = file.member_names().map_err(|e| IngestError::Hdf5(e.to_string()))?;
    let signal_names: Vec<String> = member_names
        .into_iter()
        .filter(|name| name != "secondsPastEpoch" && name != "nanoseconds")
        .collect();

    if signal_names.len() > max_signals {
        return Err(IngestError::TooManySignals {
            path: path.to_path_buf(),
            found: signal_names.len(),
            max: max_signals,
        });
    }

    let mut signals = Vec::with_capacity(signal_names.len());
    for name in signal_names {
        let (matlab_class, label) = file
            .dataset(&name)
            .map(|dataset| {
                (
                    read_optional_string_attr(&dataset, "MATLAB_class"),
                    read_optional_string_attr(&dataset, "label"),
                )
            })
            .unwrap_or((None, None));

        match read_one_signal(file, &name, timestamp_count) {
            Ok(values) => signals.push(RawSignal { name, values, matlab_class, label }),
            Err(e) => {
                warn!(signal = %name, file = %path.display(), error = %e, "signal read failed, emitting NaN-filled column");
                signals.push(RawSignal { name, values: vec![f64::NAN; timestamp_count], matlab_class, label });
            }
        }
    }
    Ok(signals)
}

/// Chooses the axis of an N-dimensional dataset that corresponds to the time axis, per
/// `spec.md` §3/§4.B and `SPEC_FULL.md` §4.B: exact length match, then ±1% tolerance match,
/// then the 2-D singleton special case, then the largest dimension as a last resort.
#[must_use]
pub fn select_time_axis(dims: &[usize], timestamp_count: usize) -> usize {
    if let Some(idx) = dims.iter().position(|&d| d == timestamp_count) {
        return idx;
    }

    if timestamp_count > 0 {
        if let Some(idx) = dims.iter().position(|&d| {
            let ratio = d as f64 / timestamp_count as f64;
            (ratio - 1.0).abs() < AXIS_MATCH_TOLERANCE
        }) {
            return idx;
        }
    }

    if dims.len() == 2 && (dims[0] == 1 || dims[1] == 1) {
        return if dims[0] > dims[1] { 0 } else { 1 };
    }

    dims.iter()
        .enumerate()
        .max_by_key(|(_, &d)| d)
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

#[cfg(feature = "storage_hdf5")]
fn read_one_signal(file: &hdf5::File, name: &str, timestamp_count: usize) -> Result<Vec<f64>> {
    let dataset = file.dataset(name).map_err(|e| IngestError::SignalRead {
        path: std::path::PathBuf::new(),
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    let shape = dataset.shape();

    if shape.len() == 1 {
        return read_axis_native_then_fallback(&dataset, shape[0]);
    }

    let axis = select_time_axis(&shape, timestamp_count);
    let axis_len = shape[axis];
    read_axis_native_then_fallback(&dataset, axis_len)
}

/// Tries `f64`, then `f32` (NaN/±∞-preserving cast), then `i32`; the final fallback (an
/// all-NaN column) is produced by the caller, not here, since it needs the expected length
/// rather than the axis length (`spec.md` §4.B, §9).
#[cfg(feature = "storage_hdf5")]
fn read_axis_native_then_fallback(dataset: &hdf5::Dataset, expected_len: usize) -> Result<Vec<f64>> {
    if let Ok(values) = dataset.read_raw::<f64>() {
        return Ok(resize_with_nan(values, expected_len));
    }
    if let Ok(values) = dataset.read_raw::<f32>() {
        return Ok(resize_with_nan(values.into_iter().map(f64::from).collect(), expected_len));
    }
    if let Ok(values) = dataset.read_raw::<i32>() {
        return Ok(resize_with_nan(values.into_iter().map(f64::from).collect(), expected_len));
    }
    Err(IngestError::SignalRead {
        path: std::path::PathBuf::new(),
        name: dataset.name(),
        reason: "no supported native type (f64/f32/i32) could be read".to_string(),
    })
}

#[cfg(feature = "storage_hdf5")]
fn resize_with_nan(mut values: Vec<f64>, expected_len: usize) -> Vec<f64> {
    values.resize(expected_len, f64::NAN);
    values
}

/// Best-effort metadata attributes (`label`, `MATLAB_class`) read from a dataset; absent
/// attributes are simply `None` (`spec.md` §4.B step 8).
#[cfg(feature = "storage_hdf5")]
pub fn read_optional_string_attr(dataset: &hdf5::Dataset, attr_name: &str) -> Option<String> {
    dataset.attr(attr_name).ok().and_then(|a| a.read_scalar::<hdf5::types::VarLenUnicode>().ok()).map(|s| s.to_string())
}

/// Best-effort filename metadata, exposed for callers that only have a path and not an open
/// file (e.g. error reporting before the file could be opened).
#[must_use]
pub fn filename_metadata(path: &Path) -> SignalFileMetadata {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    crate::signal_parser::parse_filename_metadata(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_tolerance_and_fallback() {
        assert_eq!(select_time_axis(&[100, 3], 100), 0);
    }

    #[test]
    fn within_one_percent_tolerance_matches() {
        assert_eq!(select_time_axis(&[995, 4], 1000), 0);
    }

    #[test]
    fn two_dim_singleton_axis_is_chosen_without_tolerance_check() {
        assert_eq!(select_time_axis(&[693_766, 1], 500_000), 0);
        assert_eq!(select_time_axis(&[1, 693_766], 500_000), 1);
    }

    #[test]
    fn falls_back_to_largest_dimension() {
        assert_eq!(select_time_axis(&[2, 7, 3], 100), 1);
    }

    #[test]
    fn single_dimension_always_matches_itself() {
        assert_eq!(select_time_axis(&[42], 42), 0);
    }

    #[test]
    #[cfg(feature = "storage_hdf5")]
    fn label_and_matlab_class_attributes_are_populated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("BSA_LCLS_20231114_221320.h5");
        let file = hdf5::File::create(&path).expect("create fixture");
        file.new_dataset::<u64>()
            .create("secondsPastEpoch", 2)
            .expect("create secondsPastEpoch")
            .write(&[1_700_000_000u64, 1_700_000_001])
            .expect("write secondsPastEpoch");
        let dataset = file
            .new_dataset::<f64>()
            .create("BPMS_DMPH_502_TMITBR", 2)
            .expect("create signal dataset");
        dataset.write(&[1.5, 2.5]).expect("write signal values");
        dataset
            .new_attr::<hdf5::types::VarLenUnicode>()
            .create("label")
            .expect("create label attr")
            .write_scalar(&"Bunch charge".parse::<hdf5::types::VarLenUnicode>().expect("parse label"))
            .expect("write label attr");
        dataset
            .new_attr::<hdf5::types::VarLenUnicode>()
            .create("MATLAB_class")
            .expect("create MATLAB_class attr")
            .write_scalar(&"double".parse::<hdf5::types::VarLenUnicode>().expect("parse MATLAB_class"))
            .expect("write MATLAB_class attr");
        drop(dataset);
        drop(file);

        let contents = read_file(&path, 1000).expect("read fixture");
        let signal = &contents.signals[0];
        assert_eq!(signal.info.label.as_deref(), Some("Bunch charge"));
        assert_eq!(signal.info.matlab_class.as_deref(), Some("double"));
    }
}
