//! Per-run progress counters, exponential-moving-average file timing, and the wall-clock
//! watchdog (`spec.md` §4.H).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{IngestError, Result};

/// Smoothing factor for the per-file timing EMA (`spec.md` §4.H).
const EMA_ALPHA: f64 = 0.1;
/// Per-sample cap before it enters the EMA, to resist outliers (`spec.md` §4.H).
const EMA_SAMPLE_CAP_SECS: f64 = 300.0;

/// Atomic, per-run counters. Safe to share across worker threads via `&ProgressTracker`.
#[derive(Debug, Default)]
struct Counters {
    files_processed: AtomicU64,
    files_failed: AtomicU64,
    signals_processed: AtomicU64,
    bytes_processed: AtomicU64,
    errors: AtomicU64,
}

/// Tracks run-wide progress: counters, a smoothed per-file duration estimate, and periodic
/// progress-line emission.
pub struct ProgressTracker {
    counters: Counters,
    total_files: usize,
    progress_interval: usize,
    started_at: Instant,
    avg_file_secs: Mutex<f64>,
}

impl ProgressTracker {
    /// Builds a tracker for a run processing `total_files`, emitting a progress line every
    /// `progress_interval` completions (plus once at the end).
    #[must_use]
    pub fn new(total_files: usize, progress_interval: usize) -> Self {
        Self {
            counters: Counters::default(),
            total_files,
            progress_interval: progress_interval.max(1),
            started_at: Instant::now(),
            avg_file_secs: Mutex::new(0.0),
        }
    }

    /// Records one file's outcome: success/failure, signals emitted, bytes read, and elapsed
    /// wall time. Emits a progress line if this completion lands on the reporting interval or
    /// is the run's last file.
    pub fn record_file(&self, success: bool, signals: u64, bytes: u64, elapsed: Duration) {
        if success {
            self.counters.files_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.files_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.signals_processed.fetch_add(signals, Ordering::Relaxed);
        self.counters.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.update_ema(elapsed);

        let completed = self.completed();
        let is_last = self.total_files > 0 && completed as usize >= self.total_files;
        if completed % self.progress_interval as u64 == 0 || is_last {
            self.emit_progress_line();
        }
    }

    /// Increments the per-record/per-signal error counter without attributing it to a whole
    /// file (used for `SignalRead`/`Exceptional` failures that don't fail the containing file).
    pub fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn update_ema(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64().min(EMA_SAMPLE_CAP_SECS);
        let mut avg = self.avg_file_secs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *avg = if *avg <= 0.0 { sample } else { EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * *avg };
    }

    /// Files processed (successfully or not) so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.counters.files_processed.load(Ordering::Relaxed) + self.counters.files_failed.load(Ordering::Relaxed)
    }

    /// Files that completed successfully.
    #[must_use]
    pub fn files_processed(&self) -> u64 {
        self.counters.files_processed.load(Ordering::Relaxed)
    }

    /// Files that failed outright.
    #[must_use]
    pub fn files_failed(&self) -> u64 {
        self.counters.files_failed.load(Ordering::Relaxed)
    }

    /// Total signals successfully read and enqueued for ingest.
    #[must_use]
    pub fn signals_processed(&self) -> u64 {
        self.counters.signals_processed.load(Ordering::Relaxed)
    }

    /// Total bytes read from H5 files.
    #[must_use]
    pub fn bytes_processed(&self) -> u64 {
        self.counters.bytes_processed.load(Ordering::Relaxed)
    }

    /// Per-signal/per-record errors that didn't fail their containing file.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.counters.errors.load(Ordering::Relaxed)
    }

    /// Renders and prints the current progress line (`completed/total`, percentage, files/s,
    /// MB/s, signals in, failures), matching `spec.md` §4.H.
    pub fn emit_progress_line(&self) {
        let completed = self.completed();
        let pct = if self.total_files == 0 { 100.0 } else { 100.0 * completed as f64 / self.total_files as f64 };
        let elapsed_secs = self.started_at.elapsed().as_secs_f64().max(1e-9);
        let files_per_sec = completed as f64 / elapsed_secs;
        let mb_per_sec = (self.bytes_processed() as f64 / (1024.0 * 1024.0)) / elapsed_secs;
        println!(
            "\r{completed}/{total} ({pct:.1}%) {files_per_sec:.2} files/s {mb_per_sec:.2} MB/s signals={signals} failures={failures}",
            total = self.total_files,
            signals = self.signals_processed(),
            failures = self.files_failed(),
        );
    }

    /// Builds a [`Watchdog`] for `watchdog_hours`, anchored to this tracker's start time.
    #[must_use]
    pub fn watchdog(&self, watchdog_hours: u64) -> Watchdog {
        Watchdog { deadline: self.started_at + Duration::from_secs(watchdog_hours * 3600) }
    }
}

/// Wall-clock deadline for the whole run; fires if completion doesn't reach the target in time
/// (`spec.md` §4.H, default 24h).
pub struct Watchdog {
    deadline: Instant,
}

impl Watchdog {
    /// Checks whether the deadline has elapsed; if so, returns [`IngestError::Watchdog`] with
    /// the supplied progress snapshot.
    ///
    /// # Errors
    /// Returns [`IngestError::Watchdog`] once `Instant::now()` passes the configured deadline.
    pub fn check(&self, completed: usize, total: usize) -> Result<()> {
        if Instant::now() >= self.deadline {
            return Err(IngestError::Watchdog {
                elapsed_secs: self.deadline.elapsed().as_secs(),
                completed,
                total,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_counters_accumulate_across_files() {
        let tracker = ProgressTracker::new(3, 16);
        tracker.record_file(true, 10, 1024, Duration::from_millis(5));
        tracker.record_file(false, 0, 512, Duration::from_millis(5));
        tracker.record_file(true, 20, 2048, Duration::from_millis(5));

        assert_eq!(tracker.files_processed(), 2);
        assert_eq!(tracker.files_failed(), 1);
        assert_eq!(tracker.signals_processed(), 30);
        assert_eq!(tracker.bytes_processed(), 3584);
        assert_eq!(tracker.completed(), 3);
    }

    #[test]
    fn errors_counted_independently_of_file_outcome() {
        let tracker = ProgressTracker::new(1, 16);
        tracker.record_error();
        tracker.record_error();
        assert_eq!(tracker.errors(), 2);
        assert_eq!(tracker.completed(), 0);
    }

    #[test]
    fn watchdog_does_not_fire_before_deadline() {
        let tracker = ProgressTracker::new(1, 16);
        let watchdog = tracker.watchdog(24);
        assert!(watchdog.check(0, 1).is_ok());
    }
}
