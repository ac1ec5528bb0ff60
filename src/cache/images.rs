//! Content-addressed storage for worker outputs and derived images.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;
use crate::core::{ImagePath, digest_file};
use crate::utils::{BenchError, BenchResult, ensure_dir};

const IMAGES_DIR: &str = "images";
const TMP_DIR: &str = "tmp";

/// Tree of images named by their own content digest.
///
/// Identical outputs produced by different chains or runs land on the same
/// file. Keys handed out by [`ImageStore::store`] are relative to the store
/// root.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    tmp: PathBuf,
}

impl ImageStore {
    /// Opens the store under `work_dir`, creating its directories.
    pub fn open(work_dir: &Path) -> BenchResult<Self> {
        let root = work_dir.join(IMAGES_DIR);
        let tmp = work_dir.join(TMP_DIR);
        ensure_dir(&root)?;
        ensure_dir(&tmp)?;
        Ok(Self { root, tmp })
    }

    /// Fresh scratch file with the given extension, removed on drop.
    pub fn scratch(&self, ext: &str) -> BenchResult<TempPath> {
        let suffix = if ext.is_empty() { String::new() } else { format!(".{ext}") };
        let file = tempfile::Builder::new()
            .prefix("scratch-")
            .suffix(&suffix)
            .tempfile_in(&self.tmp)
            .map_err(|e| BenchError::io(format!("Cannot create scratch file: {e}")))?;
        Ok(file.into_temp_path())
    }

    /// Moves `file` into the store under its digest and returns its key.
    ///
    /// When an identical image is already stored, `file` is dropped instead.
    pub fn store(&self, file: &Path, ext: &str) -> BenchResult<String> {
        let digest = digest_file(file)?;
        let key = Self::key_for(&digest, ext);
        let target = self.root.join(&key);

        if target.exists() {
            debug!(key = %key, "Stored image already present");
            let _ = fs::remove_file(file);
            return Ok(key);
        }

        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        if fs::rename(file, &target).is_err() {
            // Scratch and store may live on different filesystems.
            fs::copy(file, &target)?;
            let _ = fs::remove_file(file);
        }
        debug!(key = %key, "Stored image");
        Ok(key)
    }

    /// Absolute path for a store key.
    pub fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_file()
    }

    /// Image handle for a stored key, with the digest taken from the key.
    pub fn image(&self, key: &str) -> ImagePath {
        let path = self.resolve(key);
        let digest = Path::new(key)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
        match digest {
            Some(digest) => ImagePath::with_digest(path, digest),
            None => ImagePath::new(path),
        }
    }

    fn key_for(digest: &str, ext: &str) -> String {
        let (shard, _) = digest.split_at(2.min(digest.len()));
        if ext.is_empty() {
            format!("{shard}/{digest}")
        } else {
            format!("{shard}/{digest}.{ext}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::digest_bytes;
    use tempfile::tempdir;

    #[test]
    fn identical_content_shares_one_file() {
        let dir = tempdir().unwrap();
        let store = ImageStore::open(dir.path()).unwrap();

        let a = store.scratch("png").unwrap();
        fs::write(&a, b"same bytes").unwrap();
        let b = store.scratch("png").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        let key_a = store.store(&a, "png").unwrap();
        let key_b = store.store(&b, "png").unwrap();
        assert_eq!(key_a, key_b);

        let digest = digest_bytes(b"same bytes");
        assert_eq!(key_a, format!("{}/{}.png", &digest[..2], digest));
        assert!(store.contains(&key_a));
        assert!(!b.exists());
    }

    #[test]
    fn stored_image_knows_its_digest() {
        let dir = tempdir().unwrap();
        let store = ImageStore::open(dir.path()).unwrap();

        let scratch = store.scratch("").unwrap();
        fs::write(&scratch, b"payload").unwrap();
        let key = store.store(&scratch, "").unwrap();

        let image = store.image(&key);
        assert_eq!(image.digest().unwrap(), digest_bytes(b"payload"));
        assert_eq!(image.path(), store.resolve(&key));
    }
}
