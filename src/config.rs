//! Layered configuration for the ingestion and decode binaries.
//!
//! Settings are resolved in increasing precedence: compiled-in defaults → an optional
//! `dp-ingest.toml` file → environment variables prefixed `DP_INGEST_` → CLI flags (applied by
//! the caller after [`Settings::load`] returns, via [`Settings::apply_cli_overrides`]).
//!
//! Example: `DP_INGEST_WORKERS=4` overrides `workers`; `DP_INGEST_INGEST_SERVER=host:port`
//! overrides `ingest_server`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// Batch size is clamped to this inclusive range regardless of source (`spec.md` §4.F).
pub const BATCH_SIZE_RANGE: std::ops::RangeInclusive<u32> = 10..=24;

/// Resolved configuration for a run of the ingestion or decode binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `host:port` of the DP ingestion service.
    pub ingest_server: String,
    /// `host:port` of the DP query service.
    pub query_server: String,
    /// Number of worker threads driving file-level parallelism.
    pub workers: usize,
    /// Records per streaming batch, clamped to [`BATCH_SIZE_RANGE`].
    pub batch_size: u32,
    /// Per-file cap on the number of signal datasets ingested.
    pub max_signals: usize,
    /// Use streaming (client-streaming batches) instead of unary calls.
    pub streaming: bool,
    /// Skip files already present in the processed-file cache.
    pub resume: bool,
    /// Per-unary-call RPC deadline, in milliseconds.
    pub call_deadline_ms: u64,
    /// Per-streaming-session RPC deadline, in milliseconds.
    pub stream_deadline_ms: u64,
    /// Wall-clock watchdog limit, in hours.
    pub watchdog_hours: u64,
    /// Emit a progress line every this many completed files.
    pub progress_interval: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ingest_server: "localhost:50051".to_string(),
            query_server: "localhost:50052".to_string(),
            workers: default_worker_count(),
            batch_size: 16,
            max_signals: 1000,
            streaming: false,
            resume: false,
            call_deadline_ms: 30_000,
            stream_deadline_ms: 300_000,
            watchdog_hours: 24,
            progress_interval: 16,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4).min(8)
}

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("dp-h5-ingest defaults")
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Settings::default()).data()
    }
}

impl Settings {
    /// Loads settings from the default search path: compiled-in defaults, an optional
    /// `dp-ingest.toml` in the current directory, then `DP_INGEST_`-prefixed environment
    /// variables.
    ///
    /// # Errors
    /// Returns an error if an existing `dp-ingest.toml` fails to parse, or an environment
    /// variable has the wrong type for its field.
    pub fn load() -> Result<Self> {
        Self::load_from("dp-ingest.toml")
    }

    /// Loads settings the same way as [`Settings::load`], but from an explicit file path.
    ///
    /// # Errors
    /// Returns an error if the file exists but fails to parse, or an environment variable has
    /// the wrong type for its field.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let figment = Figment::from(Settings::default())
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DP_INGEST_").split("_"));
        let settings: Settings =
            figment.extract().map_err(|e| IngestError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates cross-field and range invariants, clamping `batch_size` into range rather
    /// than rejecting it (`spec.md` §4.F: "default 10-24, configurable").
    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(IngestError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.ingest_server.is_empty() || self.query_server.is_empty() {
            return Err(IngestError::InvalidConfig(
                "ingest_server and query_server must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `batch_size` clamped into [`BATCH_SIZE_RANGE`].
    #[must_use]
    pub fn clamped_batch_size(&self) -> u32 {
        self.batch_size.clamp(*BATCH_SIZE_RANGE.start(), *BATCH_SIZE_RANGE.end())
    }

    /// Merges CLI-flag overrides (highest precedence) onto an already-loaded `Settings`.
    #[must_use]
    pub fn apply_cli_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(server) = &overrides.server {
            self.ingest_server = server.clone();
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(max_signals) = overrides.max_signals {
            self.max_signals = max_signals;
        }
        if overrides.streaming {
            self.streaming = true;
        }
        if overrides.resume {
            self.resume = true;
        }
        self
    }
}

/// CLI-flag overrides that, when present, take precedence over every other configuration
/// source. Built from [`crate::cli::Cli`] and applied via [`Settings::apply_cli_overrides`].
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Override for `ingest_server`.
    pub server: Option<String>,
    /// Override for `workers`.
    pub workers: Option<usize>,
    /// Override for `batch_size`.
    pub batch_size: Option<u32>,
    /// Override for `max_signals`.
    pub max_signals: Option<usize>,
    /// Force `streaming = true`.
    pub streaming: bool,
    /// Force `resume = true`.
    pub resume: bool,
}

/// Output directory helper: where the processed-file cache lives for a given scan root, absent
/// an explicit `--output` flag (the root directory itself, matching `spec.md` §6's
/// `<output>/.processed_cache`).
#[must_use]
pub fn default_output_dir(root: &Path) -> PathBuf {
    root.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.ingest_server, "localhost:50051");
        assert_eq!(settings.query_server, "localhost:50052");
        assert_eq!(settings.batch_size, 16);
        assert_eq!(settings.max_signals, 1000);
        assert!(!settings.streaming);
        assert!(!settings.resume);
        assert_eq!(settings.watchdog_hours, 24);
        assert_eq!(settings.progress_interval, 16);
    }

    #[test]
    fn batch_size_clamps_into_range() {
        let mut settings = Settings::default();
        settings.batch_size = 1000;
        assert_eq!(settings.clamped_batch_size(), 24);
        settings.batch_size = 1;
        assert_eq!(settings.clamped_batch_size(), 10);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut settings = Settings::default();
        settings.workers = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let settings = Settings::default().apply_cli_overrides(&CliOverrides {
            server: Some("dp.example.org:50051".to_string()),
            workers: Some(2),
            ..Default::default()
        });
        assert_eq!(settings.ingest_server, "dp.example.org:50051");
        assert_eq!(settings.workers, 2);
    }
}
