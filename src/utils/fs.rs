use std::fs;
use std::path::Path;
use crate::utils::{BenchError, BenchResult};

/// Get file size in bytes
pub fn get_file_size(path: impl AsRef<Path>) -> BenchResult<u64> {
    fs::metadata(path.as_ref())
        .map(|m| m.len())
        .map_err(|e| BenchError::io(format!(
            "Failed to get size of {}: {}", path.as_ref().display(), e
        )))
}

/// Creates `path` and all of its parents if missing
pub fn ensure_dir(path: impl AsRef<Path>) -> BenchResult<()> {
    fs::create_dir_all(path.as_ref())
        .map_err(|e| BenchError::io(format!(
            "Failed to create directory {}: {}", path.as_ref().display(), e
        )))
}
