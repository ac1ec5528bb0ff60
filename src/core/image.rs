//! Image handle with lazily computed content digest and validity tag.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use crate::utils::{BenchError, BenchResult, get_file_size};

/// Validity tag of an image on disk.
///
/// Changes whenever the file is rewritten, even with identical content,
/// because the modification time is part of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageEtag {
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub digest: String,
}

/// A path to an image plus its memoized digest and etag.
///
/// Cheap to clone; the memoized values travel with the clone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagePath {
    path: PathBuf,
    #[serde(skip)]
    digest: OnceCell<String>,
    #[serde(skip)]
    etag: OnceCell<ImageEtag>,
}

impl ImagePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            digest: OnceCell::new(),
            etag: OnceCell::new(),
        }
    }

    /// Handle for a file whose digest is already known, e.g. a stored result.
    pub fn with_digest(path: impl Into<PathBuf>, digest: impl Into<String>) -> Self {
        let image = Self::new(path);
        let _ = image.digest.set(digest.into());
        image
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase extension, used to name stored copies of this image.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }

    /// Hex SHA-256 of the file content, computed on first use.
    pub fn digest(&self) -> BenchResult<&str> {
        self.digest
            .get_or_try_init(|| digest_file(&self.path))
            .map(String::as_str)
    }

    /// `(modification time, digest)`, computed on first use.
    pub fn etag(&self) -> BenchResult<&ImageEtag> {
        self.etag.get_or_try_init(|| -> BenchResult<ImageEtag> {
            let modified = std::fs::metadata(&self.path)?.modified()?;
            let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
            Ok(ImageEtag {
                mtime_secs: since_epoch.as_secs(),
                mtime_nanos: since_epoch.subsec_nanos(),
                digest: self.digest()?.to_string(),
            })
        })
    }

    pub fn size(&self) -> BenchResult<u64> {
        get_file_size(&self.path)
    }

    /// Forgets the memoized digest and etag so they are recomputed on next use.
    pub fn invalidate(&mut self) {
        self.digest.take();
        self.etag.take();
    }
}

impl PartialEq for ImagePath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ImagePath {}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Hex SHA-256 of a file, streamed so large images are not read into memory.
pub fn digest_file(path: &Path) -> BenchResult<String> {
    let mut file = File::open(path)
        .map_err(|e| BenchError::io(format!("Cannot read {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of an in-memory buffer.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
