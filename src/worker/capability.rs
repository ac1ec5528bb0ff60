//! Interface of an optimization worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use crate::utils::ImageFormat;

/// Resolved version of one external binary a worker depends on.
///
/// `version` is `None` when the binary could not be run; that still feeds
/// the worker etag, so installing the binary later invalidates results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BinVersion {
    pub name: String,
    pub version: Option<String>,
}

/// One configured optimization worker.
///
/// Implementations are opaque to the explorer: it only needs identity
/// metadata and the ability to try to optimize `src` into `dst`.
pub trait Worker: Send + Sync + fmt::Debug {
    /// Stable identifier of the worker kind, shared by all its option variants.
    fn kind(&self) -> &str;

    /// Formats this worker can process.
    fn formats(&self) -> &[ImageFormat];

    /// Position of this worker kind in the canonical chain order.
    fn run_order(&self) -> i32;

    /// Options this instance was configured with.
    fn options(&self) -> &BTreeMap<String, Value>;

    /// Option values the kind uses when nothing is configured.
    fn default_options(&self) -> &BTreeMap<String, Value>;

    /// Names of options whose differing values allow two variants to run back to back.
    fn allow_consecutive(&self) -> &[String];

    /// Versions of the external binaries this worker runs.
    fn bin_versions(&self) -> Vec<BinVersion>;

    /// Digest of the worker's own implementation and definition.
    fn implementation_digest(&self) -> String;

    /// Tries to write an optimized version of `src` to `dst`.
    ///
    /// Returns `true` only when `dst` holds a smaller, valid image.
    fn optimize(&self, src: &Path, dst: &Path) -> bool;

    fn handles(&self, format: ImageFormat) -> bool {
        self.formats().contains(&format)
    }
}
