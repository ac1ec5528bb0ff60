//! A worker instance plus the identity the explorer and cache key on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use crate::utils::ImageFormat;
use super::capability::{BinVersion, Worker};
use super::command::option_to_arg;

/// Adjacency key: variants with equal `ConsId` never run back to back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsId {
    pub kind: String,
    /// Values of the options declared as allowing consecutive runs
    pub options: BTreeMap<String, Value>,
}

/// Validity tag of a worker variant.
///
/// Changes whenever re-running the variant could give a different result:
/// other options, another binary version, or changed worker code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerEtag {
    pub id: String,
    pub bin_versions: Vec<BinVersion>,
    pub implementation: String,
}

/// One configured worker with its derived identity.
#[derive(Clone)]
pub struct WorkerVariant {
    worker: Arc<dyn Worker>,
    pub id: String,
    pub run_order: i32,
    pub cons_id: ConsId,
    pub etag: WorkerEtag,
}

impl WorkerVariant {
    /// Derives identity from `worker`, resolving its binary versions.
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        let id = variant_id(worker.kind(), worker.options(), worker.default_options());

        let cons_options = worker
            .allow_consecutive()
            .iter()
            .map(|name| {
                let value = worker
                    .options()
                    .get(name)
                    .or_else(|| worker.default_options().get(name))
                    .cloned()
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();

        let mut bin_versions = worker.bin_versions();
        bin_versions.sort();

        Self {
            cons_id: ConsId {
                kind: worker.kind().to_string(),
                options: cons_options,
            },
            etag: WorkerEtag {
                id: id.clone(),
                bin_versions,
                implementation: worker.implementation_digest(),
            },
            run_order: worker.run_order(),
            id,
            worker,
        }
    }

    pub fn worker(&self) -> &dyn Worker {
        self.worker.as_ref()
    }

    pub fn handles(&self, format: ImageFormat) -> bool {
        self.worker.handles(format)
    }

    pub fn optimize(&self, src: &Path, dst: &Path) -> bool {
        self.worker.optimize(src, dst)
    }

    /// True when `next` may directly follow this variant in a chain.
    pub fn may_precede(&self, next: &WorkerVariant) -> bool {
        next.cons_id != self.cons_id && next.run_order >= self.run_order
    }
}

impl fmt::Debug for WorkerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerVariant")
            .field("id", &self.id)
            .field("run_order", &self.run_order)
            .field("cons_id", &self.cons_id)
            .finish()
    }
}

impl fmt::Display for WorkerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// `kind` alone, or `kind(name:value, ...)` listing the non-default options.
pub(crate) fn variant_id(kind: &str, options: &BTreeMap<String, Value>, defaults: &BTreeMap<String, Value>) -> String {
    let changed: Vec<String> = options
        .iter()
        .filter(|(name, value)| defaults.get(*name) != Some(*value))
        .map(|(name, value)| format!("{}:{}", name, option_to_arg(value)))
        .collect();

    if changed.is_empty() {
        kind.to_string()
    } else {
        format!("{}({})", kind, changed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::config::WorkerConfig;

    const CONFIG: &str = r#"{"workers": [
        {
            "kind": "pngquant", "bin": "pngquant-missing-for-tests", "formats": ["png"],
            "run_order": 2,
            "args": ["--quality={quality}", "--speed={speed}", "--output", "{dst}", "{src}"],
            "defaults": {"quality": 100, "speed": 3},
            "allow_consecutive": ["quality"],
            "variants": {"quality": [80, 100], "speed": [1, 3]}
        },
        {
            "kind": "advpng", "bin": "advpng-missing-for-tests", "formats": ["png"],
            "run_order": 4, "in_place": true,
            "args": ["-z", "-{level}", "{dst}"],
            "defaults": {"level": 4},
            "variants": {"level": [1, 4]}
        }
    ]}"#;

    fn variants() -> Vec<WorkerVariant> {
        WorkerConfig::parse(CONFIG)
            .unwrap()
            .expand(None)
            .into_iter()
            .map(WorkerVariant::new)
            .collect()
    }

    #[test]
    fn ids_list_only_non_default_options() {
        let ids: Vec<String> = variants().iter().map(|v| v.id.clone()).collect();
        assert_eq!(ids, vec![
            "pngquant(quality:80, speed:1)",
            "pngquant(quality:80)",
            "pngquant(speed:1)",
            "pngquant",
            "advpng(level:1)",
            "advpng",
        ]);
    }

    #[test]
    fn cons_id_covers_allow_consecutive_options_only() {
        let v = variants();
        // same quality, different speed
        assert_eq!(v[0].cons_id, v[1].cons_id);
        assert_ne!(v[1].cons_id, v[3].cons_id);
        assert_eq!(v[4].cons_id, v[5].cons_id);

        assert!(!v[0].may_precede(&v[1]));
        assert!(v[1].may_precede(&v[3]));
        assert!(v[0].may_precede(&v[4]));
        assert!(!v[4].may_precede(&v[0]));
        assert!(!v[4].may_precede(&v[5]));
    }

    #[test]
    fn etag_tracks_id_and_missing_binary() {
        let v = variants();
        assert_eq!(v[3].etag.id, "pngquant");
        assert_eq!(v[3].etag.bin_versions, vec![BinVersion {
            name: "pngquant-missing-for-tests".to_string(),
            version: None,
        }]);
        assert_ne!(v[0].etag, v[1].etag);
        assert_eq!(v[0].etag.implementation, v[1].etag.implementation);
    }
}
