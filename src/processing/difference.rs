//! Perceptual difference between two images, normalized and memoized.

use std::sync::Arc;
use tracing::debug;
use crate::cache::{CacheStore, ImageStore};
use crate::core::ImagePath;
use crate::utils::{BenchError, BenchResult};
use super::magick::ImageOps;

const NS_DIFFERENCE: &str = "difference";
const NS_FRAMES: &str = "frame-count";
const NS_ALPHA: &str = "has-alpha";
const NS_FLATTENED: &str = "flattened";
const NS_OVER_NOISE: &str = "over-noise";

/// Extension of images derived for comparison.
const DERIVED_EXT: &str = "png";

/// Distortion of one image relative to another.
///
/// Results are cached under the unordered pair of content digests, so the
/// argument order never matters and each pair is computed once. Inputs are
/// normalized first: animations are flattened to a single frame, and when
/// only one side has an alpha channel both are composited over noise.
pub struct DifferenceEstimator {
    cache: Arc<CacheStore>,
    store: ImageStore,
    ops: Box<dyn ImageOps>,
}

impl DifferenceEstimator {
    pub fn new(cache: Arc<CacheStore>, store: ImageStore, ops: Box<dyn ImageOps>) -> Self {
        Self { cache, store, ops }
    }

    /// Non-negative distortion between `a` and `b`.
    ///
    /// Any failure of the external tools is reported as
    /// [`BenchError::Comparison`] naming both images.
    pub fn difference(&self, a: &ImagePath, b: &ImagePath) -> BenchResult<f64> {
        let (digest_a, digest_b) = (a.digest()?, b.digest()?);
        if digest_a == digest_b {
            return Ok(0.0);
        }

        // Compare in digest order so both argument orders run the same command.
        let (first, second) = if digest_a <= digest_b { (a, b) } else { (b, a) };
        let key = [first.digest()?, second.digest()?];

        self.cache.get_or_compute(NS_DIFFERENCE, &key, &(), || {
            debug!(a = %first, b = %second, "Computing difference");
            self.compute(first, second)
                .map_err(|e| BenchError::comparison(a.path(), b.path(), e.to_string()))
        })
    }

    fn compute(&self, a: &ImagePath, b: &ImagePath) -> BenchResult<f64> {
        let mut a = self.flatten_animation(a)?;
        let mut b = self.flatten_animation(b)?;

        if self.has_alpha(&a)? != self.has_alpha(&b)? {
            a = self.over_noise(&a)?;
            b = self.over_noise(&b)?;
        }

        self.ops.distortion(a.path(), b.path())
    }

    fn has_alpha(&self, image: &ImagePath) -> BenchResult<bool> {
        self.cache.get_or_compute(NS_ALPHA, image.digest()?, &(), || {
            self.ops.has_alpha(image.path())
        })
    }

    fn flatten_animation(&self, image: &ImagePath) -> BenchResult<ImagePath> {
        let frames: usize = self.cache.get_or_compute(NS_FRAMES, image.digest()?, &(), || {
            self.ops.frame_count(image.path())
        })?;
        if frames <= 1 {
            return Ok(image.clone());
        }
        self.derived(NS_FLATTENED, image, |src, dst| self.ops.flatten(src, dst))
    }

    fn over_noise(&self, image: &ImagePath) -> BenchResult<ImagePath> {
        self.derived(NS_OVER_NOISE, image, |src, dst| self.ops.over_noise(src, dst))
    }

    /// Derived image of `image`, stored and cached by the source digest.
    fn derived<F>(&self, namespace: &str, image: &ImagePath, make: F) -> BenchResult<ImagePath>
    where
        F: FnOnce(&std::path::Path, &std::path::Path) -> BenchResult<()>,
    {
        let digest = image.digest()?;
        if let Some(key) = self.cache.get::<_, _, String>(namespace, digest, &())? {
            if self.store.contains(&key) {
                return Ok(self.store.image(&key));
            }
        }

        let scratch = self.store.scratch(DERIVED_EXT)?;
        make(image.path(), &scratch)?;
        let key = self.store.store(&scratch, DERIVED_EXT)?;
        self.cache.set(namespace, digest, &(), &key)?;
        Ok(self.store.image(&key))
    }
}
