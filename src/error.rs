//! Error types for the H5→DP ingestion engine.
//!
//! `IngestError` consolidates every failure this crate can produce, from fatal
//! configuration problems (which abort the run before any file is touched) down to
//! per-signal read failures (which are confined to the smallest scope that can still make
//! progress). Using `thiserror` keeps `?`-based propagation working throughout the pipeline
//! while still giving callers a structured way to decide whether a failure is fatal,
//! per-file, or per-signal.

use thiserror::Error;

/// Convenience alias for results using [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

/// The error type for the ingestion and decode pipelines.
#[derive(Error, Debug)]
pub enum IngestError {
    /// CLI arguments or configuration could not be parsed or loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration parsed but failed semantic validation (bad address, out-of-range value).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The ingest or query channel could not be established.
    #[error("could not connect to {server}: {source}")]
    Connectivity {
        /// The `host:port` we attempted to reach.
        server: String,
        /// Underlying transport error.
        #[source]
        source: tonic::transport::Error,
    },

    /// `RegisterProvider` failed; this is always fatal for a run.
    #[error("provider registration failed: {0}")]
    RegistrationFailed(String),

    /// An HDF5 file could not be opened or is outside the accepted size range.
    #[error("cannot open {path}: {reason}")]
    FileOpen {
        /// Path of the offending file.
        path: std::path::PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// The file has no usable `secondsPastEpoch` dataset, or it is empty/oversized.
    #[error("{path}: missing or invalid timestamps ({reason})")]
    MissingTimestamps {
        /// Path of the offending file.
        path: std::path::PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// The root group contains more signal datasets than `max_signals` allows.
    #[error("{path}: {found} signals exceeds configured maximum {max}")]
    TooManySignals {
        /// Path of the offending file.
        path: std::path::PathBuf,
        /// Number of signal datasets discovered.
        found: usize,
        /// Configured cap.
        max: usize,
    },

    /// A single signal dataset could not be read at all (not even as a NaN fallback).
    #[error("signal {name} in {path}: {reason}")]
    SignalRead {
        /// Path of the containing file.
        path: std::path::PathBuf,
        /// Name of the signal dataset.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The underlying HDF5 library raised an error.
    #[error("HDF5 error: {0}")]
    Hdf5(String),

    /// An RPC call failed at the transport/status level.
    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// An `ExceptionalResult` was returned by the server with a structured status.
    #[error("server returned {status:?}: {message}")]
    Exceptional {
        /// The status taxonomy value (`REJECT` / `ERROR` / `EMPTY` / `NOT_READY`).
        status: crate::model::ExceptionalStatus,
        /// Server-supplied message.
        message: String,
    },

    /// The configured wall-clock timeout elapsed before all files completed.
    #[error("watchdog timeout after {elapsed_secs}s ({completed}/{total} files completed)")]
    Watchdog {
        /// Seconds elapsed when the watchdog fired.
        elapsed_secs: u64,
        /// Files completed at that point.
        completed: usize,
        /// Total files submitted.
        total: usize,
    },

    /// Filesystem I/O failure outside the HDF5 read path (scanning, cache file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "storage_hdf5")]
impl From<hdf5::Error> for IngestError {
    fn from(value: hdf5::Error) -> Self {
        IngestError::Hdf5(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_and_reason() {
        let err = IngestError::FileOpen {
            path: "/data/run1.h5".into(),
            reason: "size 512 bytes below 1KiB minimum".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("/data/run1.h5"));
        assert!(rendered.contains("below 1KiB"));
    }

    #[test]
    fn watchdog_message_reports_progress() {
        let err = IngestError::Watchdog {
            elapsed_secs: 86400,
            completed: 41,
            total: 50,
        };
        assert!(err.to_string().contains("41/50"));
    }
}
