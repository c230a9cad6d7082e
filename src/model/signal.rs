//! Signal identity, file metadata, and the `Signal`/`IngestRecord` aggregate types
//! (`spec.md` §3).

use super::timestamp::{DataTimestamps, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Metadata derived from an H5 filename matching `ORIGIN_PATHWAY_YYYYMMDD_HHMMSS[_PROJECT]`.
///
/// Parsing is best-effort and non-fatal: a filename that doesn't match the convention yields
/// `"unknown_*"` placeholders rather than an error (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalFileMetadata {
    /// The facility/subsystem that produced the file.
    pub origin: String,
    /// The acquisition pathway or beamline.
    pub pathway: String,
    /// Acquisition date, `YYYYMMDD`.
    pub date: String,
    /// Acquisition time, `HHMMSS`.
    pub time: String,
    /// Optional project tag, when present in the filename.
    pub project: Option<String>,
}

impl SignalFileMetadata {
    /// Placeholder metadata used when a filename doesn't match the recognized convention.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            origin: "unknown_origin".to_string(),
            pathway: "unknown_pathway".to_string(),
            date: "unknown_date".to_string(),
            time: "unknown_time".to_string(),
            project: None,
        }
    }
}

/// Structured metadata derived from a PV identifier string (`spec.md` §3, §4.C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    /// The full, unparsed PV name.
    pub full_name: String,
    /// `DEVICE` token, or `"unknown"` if the name didn't match the convention.
    pub device: String,
    /// `AREA` token.
    pub device_area: String,
    /// `LOCATION` token (digits).
    pub device_location: String,
    /// `ATTRIBUTE` token.
    pub device_attribute: String,
    /// Inferred signal type (e.g. `"position"`, `"charge"`), default `"measurement"`.
    pub signal_type: String,
    /// Inferred units (e.g. `"mm"`, `"pC"`), default `"unknown"`.
    pub units: String,
    /// `MATLAB_class` HDF5 attribute, if present.
    pub matlab_class: Option<String>,
    /// `label` HDF5 attribute, if present.
    pub label: Option<String>,
}

/// One signal extracted from an H5 file: identity, file context, shared timestamps, and the
/// numeric series itself.
///
/// Invariant: `values.len() == timestamps.len()` — a dataset whose native axis didn't match
/// the timestamp count was either re-sliced onto the matching axis or NaN-filled to the
/// expected length (`spec.md` §3, §4.B).
#[derive(Debug, Clone)]
pub struct Signal {
    /// Structured identity derived from the PV name.
    pub info: SignalInfo,
    /// Metadata derived from the containing file's name.
    pub file_metadata: SignalFileMetadata,
    /// Timestamps shared by every signal read from the same file.
    pub timestamps: Arc<DataTimestamps>,
    /// The signal's numeric values, one per timestamp.
    pub values: Vec<f64>,
}

impl Signal {
    /// Number of valid, non-finite, and infinite samples, for attribute/tag derivation.
    #[must_use]
    pub fn value_quality_counts(&self) -> ValueQualityCounts {
        let mut counts = ValueQualityCounts::default();
        for v in &self.values {
            if v.is_nan() {
                counts.nan += 1;
            } else if v.is_infinite() {
                counts.inf += 1;
            } else {
                counts.valid += 1;
            }
        }
        counts
    }
}

/// Per-signal counts of valid/NaN/infinite samples, used to build request-builder attributes
/// and tags (`spec.md` §4.D).
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueQualityCounts {
    /// Finite, non-NaN samples.
    pub valid: usize,
    /// NaN samples.
    pub nan: usize,
    /// Infinite samples.
    pub inf: usize,
}

impl ValueQualityCounts {
    /// Total sample count across all three buckets.
    #[must_use]
    pub fn total(&self) -> usize {
        self.valid + self.nan + self.inf
    }

    /// `valid / total`, or `1.0` when there are no samples (vacuously all-valid).
    #[must_use]
    pub fn quality_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            1.0
        } else {
            self.valid as f64 / total as f64
        }
    }
}

/// Description of a bounded time window with a human-readable label, attached to an
/// [`IngestRecord`] when the run has one (`spec.md` §3, §4.D).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Human-readable description, e.g. `"H5: BPMS_DMPH_502_TMITBR"`.
    pub description: String,
    /// First timestamp covered by this record.
    pub start_time: Timestamp,
    /// Last timestamp covered by this record.
    pub stop_time: Timestamp,
}

/// The payload sent to `IngestData`/`IngestDataStream`: one signal's data frame plus
/// attributes, tags, and an idempotency key (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRecord {
    /// The provider this record is attributed to.
    pub provider_id: String,
    /// Idempotency key: `<prefix>_<monotonic-counter>_<unix-seconds>`.
    pub client_request_id: String,
    /// Timestamps for this record's data frame.
    #[serde(skip)]
    pub timestamps: Option<Arc<DataTimestamps>>,
    /// The single data column carried by this record (an H5 signal maps to exactly one
    /// column; `spec.md` §4.D builds one `IngestRecord` per signal).
    pub column: super::value::DataColumn,
    /// Free-form string attributes (`pv_name`, `source_file`, quality counters, ...).
    pub attributes: BTreeMap<String, String>,
    /// Tag set (`h5_data`, `accelerator_data`, `contains_nan`, ...).
    pub tags: BTreeSet<String>,
    /// Optional event description/time bounds.
    pub event_metadata: Option<EventMetadata>,
}

/// Process-global monotonic counter backing `clientRequestId` generation (`spec.md` §4.D,
/// §9 — "must incorporate a monotonic counter ... so restarts do not collide").
static REQUEST_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Builds a `clientRequestId` of the form `<prefix>_<monotonic-counter>_<unix-seconds>`.
///
/// `run_epoch_secs` is the wall-clock time the run started (not the current time), so that a
/// restarted process doesn't generate ids that collide with a prior run's ids for unrelated
/// signals (`spec.md` §9).
#[must_use]
pub fn next_client_request_id(prefix: &str, run_epoch_secs: u64) -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("{prefix}_{counter}_{run_epoch_secs}")
}

/// The opaque identifier returned once per run by `RegisterProvider`; every subsequent record
/// in the run carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistration {
    /// The opaque provider id.
    pub provider_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_request_ids_are_unique_within_a_run() {
        let a = next_client_request_id("h5", 1_700_000_000);
        let b = next_client_request_id("h5", 1_700_000_000);
        assert_ne!(a, b);
    }

    #[test]
    fn quality_counts_classify_nan_and_inf_separately() {
        let signal = Signal {
            info: SignalInfo {
                full_name: "BPMS_DMPH_502_TMITBR".into(),
                device: "BPMS".into(),
                device_area: "DMPH".into(),
                device_location: "502".into(),
                device_attribute: "TMITBR".into(),
                signal_type: "charge".into(),
                units: "pC".into(),
                matlab_class: None,
                label: None,
            },
            file_metadata: SignalFileMetadata::unknown(),
            timestamps: Arc::new(DataTimestamps::List(super::super::timestamp::TimestampList::new(vec![]))),
            values: vec![1.5, f64::NAN, f64::INFINITY],
        };
        let counts = signal.value_quality_counts();
        assert_eq!(counts.valid, 1);
        assert_eq!(counts.nan, 1);
        assert_eq!(counts.inf, 1);
        assert!((counts.quality_ratio() - (1.0 / 3.0)).abs() < 1e-9);
    }
}
