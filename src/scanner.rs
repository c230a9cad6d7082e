//! File discovery: recursive `.h5` enumeration, size-ascending ordering, and resume filtering
//! (`spec.md` §4.A).

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{IngestError, Result};
use crate::model::ProcessedFileCache;

/// Recursively enumerates `root` for files with extension `.h5`, sorted ascending by file
/// size so smaller files drain first (fast initial progress, better load balance near the
/// tail of a run).
///
/// Unreadable subdirectories are skipped with a warning rather than aborting the scan; a
/// missing or non-directory `root` is a fatal error (`spec.md` §4.A's failure-mode table).
///
/// # Errors
/// Returns an error if `root` does not exist or is not a directory.
pub fn scan_h5_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IngestError::Config(format!("root directory not found: {}", root.display())));
    }

    let mut files = Vec::new();
    walk(root, &mut files);

    files.sort_by_key(|path| std::fs::metadata(path).map(|m| m.len()).unwrap_or(u64::MAX));
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable subdirectory");
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("h5") {
            out.push(path);
        }
    }
}

/// Filters `files` down to those not already recorded in `cache`, used when `--resume` is set
/// (`spec.md` §4.A).
#[must_use]
pub fn filter_unprocessed(files: Vec<PathBuf>, cache: &ProcessedFileCache) -> Vec<PathBuf> {
    files.into_iter().filter(|path| !cache.is_processed(path)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn scan_finds_h5_files_recursively_sorted_by_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        File::create(dir.path().join("big.h5")).expect("create").set_len(2000).expect("set_len");
        File::create(dir.path().join("sub/small.h5")).expect("create").set_len(10).expect("set_len");
        File::create(dir.path().join("not_h5.txt")).expect("create");

        let files = scan_h5_files(dir.path()).expect("scan");
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("small.h5"));
        assert!(files[1].ends_with("big.h5"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let missing = PathBuf::from("/nonexistent/path/for/test");
        assert!(scan_h5_files(&missing).is_err());
    }

    #[test]
    fn resume_filters_out_cached_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ProcessedFileCache::open(dir.path()).expect("open cache");
        let a = dir.path().join("a.h5");
        let b = dir.path().join("b.h5");
        File::create(&a).expect("create");
        File::create(&b).expect("create");
        cache.mark_processed(&a).expect("mark");

        let remaining = filter_unprocessed(vec![a, b.clone()], &cache);
        assert_eq!(remaining, vec![b]);
    }
}
