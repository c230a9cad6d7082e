//! `ProcessedFileCache` — append-only record of already-ingested files (`spec.md` §3, §4.A).

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

/// An append-only set of absolute file paths backed by `<output>/.processed_cache`.
///
/// One path per line, UTF-8, duplicates tolerated. The in-memory set and the file handle are
/// both guarded by one mutex so `is_processed`/`mark_processed` never race each other
/// (`spec.md` §5: "mutex around both in-memory set and the append-only file").
pub struct ProcessedFileCache {
    path: PathBuf,
    inner: Mutex<CacheState>,
}

struct CacheState {
    seen: HashSet<PathBuf>,
    file: File,
}

impl ProcessedFileCache {
    /// Opens (creating if necessary) the cache file at `<output_dir>/.processed_cache`.
    ///
    /// An unreadable existing cache file is treated as empty rather than a fatal error, per
    /// `spec.md` §4.A's failure-mode table.
    ///
    /// # Errors
    /// Returns an error only if the cache file cannot be created or opened for appending.
    pub fn open(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(".processed_cache");
        let seen = match File::open(&path) {
            Ok(f) => BufReader::new(f)
                .lines()
                .map_while(std::result::Result::ok)
                .filter(|l| !l.is_empty())
                .map(PathBuf::from)
                .collect(),
            Err(_) => HashSet::new(),
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, inner: Mutex::new(CacheState { seen, file }) })
    }

    /// Path to the backing cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// O(1) membership check.
    #[must_use]
    pub fn is_processed(&self, path: &Path) -> bool {
        let state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.seen.contains(path)
    }

    /// Inserts `path` into the in-memory set and appends (and flushes) one line to the cache
    /// file. A no-op, successful call if the path was already present.
    ///
    /// # Errors
    /// Returns an error if the append-and-flush write fails.
    pub fn mark_processed(&self, path: &Path) -> Result<()> {
        let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.seen.contains(path) {
            return Ok(());
        }
        writeln!(state.file, "{}", path.display())?;
        state.file.flush()?;
        state.seen.insert(path.to_path_buf());
        Ok(())
    }

    /// Number of distinct paths currently recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.seen.len()
    }

    /// `true` if no paths have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_then_is_processed_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ProcessedFileCache::open(dir.path()).expect("open");
        let target = dir.path().join("run1.h5");
        assert!(!cache.is_processed(&target));
        cache.mark_processed(&target).expect("mark");
        assert!(cache.is_processed(&target));
    }

    #[test]
    fn reopening_recovers_prior_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("run1.h5");
        {
            let cache = ProcessedFileCache::open(dir.path()).expect("open");
            cache.mark_processed(&target).expect("mark");
        }
        let reopened = ProcessedFileCache::open(dir.path()).expect("reopen");
        assert!(reopened.is_processed(&target));
    }

    #[test]
    fn duplicate_marks_do_not_duplicate_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ProcessedFileCache::open(dir.path()).expect("open");
        let target = dir.path().join("run1.h5");
        cache.mark_processed(&target).expect("mark");
        cache.mark_processed(&target).expect("mark again");
        let contents = std::fs::read_to_string(cache.path()).expect("read cache file");
        assert_eq!(contents.lines().count(), 1);
    }
}
