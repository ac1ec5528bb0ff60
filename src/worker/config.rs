//! Worker configuration file and option-variant expansion.
//!
//! The file is JSON:
//!
//! ```json
//! {
//!   "workers": [
//!     {
//!       "kind": "optipng",
//!       "bin": "optipng",
//!       "formats": ["png"],
//!       "run_order": 0,
//!       "args": ["-o{level}", "-quiet", "-clobber", "-out", "{dst}", "{src}"],
//!       "defaults": { "level": 6 },
//!       "variants": { "level": [1, 6, 7] }
//!     }
//!   ]
//! }
//! ```
//!
//! Every option named in `variants`, `allow_consecutive` or an argument
//! placeholder must have a default. Anything malformed is rejected before
//! any image is processed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use crate::utils::{BenchError, BenchResult, ImageFormat};
use super::command::CommandWorker;
use super::variant::variant_id;
use super::Worker;

/// Placeholders every worker can use besides its own options.
const SRC_PLACEHOLDER: &str = "src";
const DST_PLACEHOLDER: &str = "dst";

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

/// An argument emitted only when a boolean option is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagArg {
    #[serde(rename = "if")]
    pub when: String,
    pub arg: String,
}

/// One command-line argument template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgTemplate {
    /// Always emitted, with `{name}` placeholders substituted
    Plain(String),
    /// Emitted when the named option is `true`
    Flag(FlagArg),
}

/// Definition of one worker kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerDefinition {
    pub kind: String,
    pub bin: String,
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    pub formats: Vec<ImageFormat>,
    #[serde(default)]
    pub run_order: i32,
    pub args: Vec<ArgTemplate>,
    /// Copy `src` to `dst` first and let the binary rewrite `dst`
    #[serde(default)]
    pub in_place: bool,
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
    #[serde(default)]
    pub allow_consecutive: Vec<String>,
    #[serde(default)]
    pub variants: BTreeMap<String, Vec<Value>>,
}

/// Top-level worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub workers: Vec<WorkerDefinition>,
}

impl WorkerConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|e| match e {
            BenchError::Config(msg) => BenchError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> BenchResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| BenchError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BenchResult<()> {
        let mut kinds = HashSet::new();
        for def in &self.workers {
            if !kinds.insert(def.kind.as_str()) {
                return Err(BenchError::config(format!("Duplicate worker kind '{}'", def.kind)));
            }
            def.validate()?;
        }

        // Ids key the caches and reports, so distinct variants must not share one.
        let mut ids = HashSet::new();
        for def in &self.workers {
            for options in def.option_sets() {
                let id = variant_id(&def.kind, &options, &def.defaults);
                if !ids.insert(id.clone()) {
                    return Err(BenchError::config(format!(
                        "worker '{}': variants resolve to duplicate id '{}'",
                        def.kind, id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Expands every definition into one worker per option variant.
    ///
    /// Order follows the file: definitions in order, then the cartesian
    /// product of `variants` with option names in sorted order.
    pub fn expand(&self, timeout: Option<Duration>) -> Vec<Arc<dyn Worker>> {
        let mut workers: Vec<Arc<dyn Worker>> = Vec::new();
        for def in &self.workers {
            let def = Arc::new(def.clone());
            for options in def.option_sets() {
                workers.push(Arc::new(CommandWorker::new(Arc::clone(&def), options, timeout)));
            }
        }
        debug!(count = workers.len(), "Expanded worker variants");
        workers
    }
}

impl WorkerDefinition {
    fn validate(&self) -> BenchResult<()> {
        let fail = |msg: String| Err(BenchError::config(format!("worker '{}': {}", self.kind, msg)));

        if self.kind.trim().is_empty() {
            return Err(BenchError::config("worker kind must not be empty"));
        }
        if self.bin.trim().is_empty() {
            return fail("bin must not be empty".to_string());
        }
        if self.formats.is_empty() {
            return fail("formats must not be empty".to_string());
        }

        for (name, values) in &self.variants {
            if !self.defaults.contains_key(name) {
                return fail(format!("variant option '{name}' has no default"));
            }
            if values.is_empty() {
                return fail(format!("variant option '{name}' lists no values"));
            }
        }
        for name in &self.allow_consecutive {
            if !self.defaults.contains_key(name) {
                return fail(format!("allow_consecutive option '{name}' has no default"));
            }
        }

        let mut uses_dst = false;
        for arg in &self.args {
            match arg {
                ArgTemplate::Plain(template) => {
                    for name in placeholders(template) {
                        if name == DST_PLACEHOLDER {
                            uses_dst = true;
                        } else if name != SRC_PLACEHOLDER && !self.defaults.contains_key(&name) {
                            return fail(format!("argument '{template}' uses unknown option '{name}'"));
                        }
                    }
                }
                ArgTemplate::Flag(flag) => {
                    if !self.defaults.get(&flag.when).is_some_and(Value::is_boolean) {
                        return fail(format!("flag '{}' needs a boolean default for '{}'", flag.arg, flag.when));
                    }
                }
            }
        }
        if !uses_dst {
            return fail("args must reference {dst}".to_string());
        }
        Ok(())
    }

    /// Resolved option sets, duplicates removed.
    pub fn option_sets(&self) -> Vec<BTreeMap<String, Value>> {
        let mut sets = vec![self.defaults.clone()];
        for (name, values) in &self.variants {
            sets = sets
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |value| {
                        let mut set = base.clone();
                        set.insert(name.clone(), value.clone());
                        set
                    })
                })
                .collect();
        }

        let mut seen = BTreeSet::new();
        sets.retain(|set| seen.insert(serde_json::to_string(set).unwrap_or_default()));
        sets
    }
}

/// Names inside `{...}` in an argument template.
pub(crate) fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PNG_CONFIG: &str = r#"{
        "workers": [
            {
                "kind": "optipng",
                "bin": "optipng",
                "formats": ["png"],
                "run_order": 1,
                "args": ["-o{level}", {"if": "strip", "arg": "-strip"}, "-out", "{dst}", "{src}"],
                "defaults": {"level": 6, "strip": true},
                "variants": {"level": [1, 6, 7], "strip": [true, false]}
            },
            {
                "kind": "pngquant",
                "bin": "pngquant",
                "formats": ["png"],
                "run_order": 2,
                "args": ["--quality=0-{quality}", "--output", "{dst}", "--force", "{src}"],
                "defaults": {"quality": 100},
                "allow_consecutive": ["quality"],
                "variants": {"quality": [80, 99]}
            }
        ]
    }"#;

    #[test]
    fn expands_cartesian_product_of_variants() {
        let config = WorkerConfig::parse(PNG_CONFIG).unwrap();
        let sets = config.workers[0].option_sets();
        assert_eq!(sets.len(), 6);
        assert_eq!(sets[0], BTreeMap::from([
            ("level".to_string(), json!(1)),
            ("strip".to_string(), json!(true)),
        ]));

        let workers = config.expand(None);
        assert_eq!(workers.len(), 8);
        assert_eq!(workers[6].kind(), "pngquant");
        assert_eq!(workers[6].options()["quality"], json!(80));
    }

    #[test]
    fn duplicate_option_sets_collapse() {
        let def = WorkerDefinition {
            kind: "jpegoptim".to_string(),
            bin: "jpegoptim".to_string(),
            version_args: default_version_args(),
            formats: vec![ImageFormat::JPEG],
            run_order: 0,
            args: vec![ArgTemplate::Plain("--dest={dst}".to_string())],
            in_place: false,
            defaults: BTreeMap::from([("max".to_string(), json!(100))]),
            allow_consecutive: vec![],
            variants: BTreeMap::from([("max".to_string(), vec![json!(100), json!(90), json!(100)])]),
        };
        assert_eq!(def.option_sets().len(), 2);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = WorkerConfig::parse(r#"{"workers": [], "extra": 1}"#).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));

        let err = WorkerConfig::parse(r#"{"workers": [{
            "kind": "x", "bin": "x", "formats": ["png"], "args": ["{dst}"], "colour": "red"
        }]}"#).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn rejects_options_without_defaults() {
        let err = WorkerConfig::parse(r#"{"workers": [{
            "kind": "x", "bin": "x", "formats": ["png"], "args": ["{dst}"],
            "variants": {"level": [1, 2]}
        }]}"#).unwrap_err();
        assert!(err.to_string().contains("'level' has no default"));

        let err = WorkerConfig::parse(r#"{"workers": [{
            "kind": "x", "bin": "x", "formats": ["png"], "args": ["-o{level}", "{dst}"]
        }]}"#).unwrap_err();
        assert!(err.to_string().contains("unknown option 'level'"));
    }

    #[test]
    fn rejects_structural_mistakes() {
        for text in [
            r#"{"workers": [{"kind": "x", "bin": "x", "formats": ["tiff"], "args": ["{dst}"]}]}"#,
            r#"{"workers": [{"kind": "x", "bin": "x", "formats": [], "args": ["{dst}"]}]}"#,
            r#"{"workers": [{"kind": "x", "bin": "x", "formats": ["png"], "args": ["{src}"]}]}"#,
            r#"{"workers": [{"kind": "x", "bin": "x", "formats": ["png"], "args": ["{dst}"]},
                            {"kind": "x", "bin": "y", "formats": ["png"], "args": ["{dst}"]}]}"#,
            r#"{"workers": [{"kind": "x", "bin": "x", "formats": ["png"], "args": ["{dst}"],
                             "defaults": {"level": 1}, "variants": {"level": []}}]}"#,
        ] {
            assert!(matches!(WorkerConfig::parse(text), Err(BenchError::Config(_))), "{text}");
        }
    }

    #[test]
    fn rejects_variants_rendering_to_same_id() {
        // 1 and "1" are distinct option sets but both render as `level:1`.
        let err = WorkerConfig::parse(r#"{"workers": [{
            "kind": "advpng", "bin": "advpng", "formats": ["png"], "args": ["-{level}", "{dst}"],
            "defaults": {"level": 4}, "variants": {"level": [1, "1"]}
        }]}"#).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert!(err.to_string().contains("duplicate id 'advpng(level:1)'"), "{err}");

        let config = WorkerConfig::parse(r#"{"workers": [{
            "kind": "advpng", "bin": "advpng", "formats": ["png"], "args": ["-{level}", "{dst}"],
            "defaults": {"level": 4}, "variants": {"level": [1, "2", 4]}
        }]}"#).unwrap();
        assert_eq!(config.expand(None).len(), 3);
    }

    #[test]
    fn finds_placeholders() {
        assert_eq!(placeholders("--quality={min}-{max}"), vec!["min", "max"]);
        assert_eq!(placeholders("plain"), Vec::<String>::new());
        assert_eq!(placeholders("{unterminated"), Vec::<String>::new());
    }
}
