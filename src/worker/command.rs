//! Worker backed by an external command-line optimizer.

use lazy_static::lazy_static;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use crate::utils::{ImageFormat, run_captured, run_quiet};
use super::capability::{BinVersion, Worker};
use super::config::{ArgTemplate, WorkerDefinition, placeholders};

/// Timeout for `--version` style queries.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    /// Versions resolved so far in this process, keyed by binary and version args.
    static ref BIN_VERSIONS: Mutex<HashMap<(String, Vec<String>), Option<String>>> =
        Mutex::new(HashMap::new());
}

/// Resolves the version string of `bin` once per process.
///
/// Takes the first non-empty line the version query prints, preferring stdout. Some
/// tools exit non-zero on `--version`, so the exit status is ignored.
pub(crate) fn resolve_version(bin: &str, args: &[String]) -> Option<String> {
    let key = (bin.to_string(), args.to_vec());
    if let Ok(versions) = BIN_VERSIONS.lock() {
        if let Some(version) = versions.get(&key) {
            return version.clone();
        }
    }

    let version = match run_captured(Command::new(bin).args(args), Some(VERSION_TIMEOUT)) {
        Ok(output) => first_line(&output.stdout).or_else(|| first_line(&output.stderr)),
        Err(e) => {
            warn!("Cannot resolve version of {}: {}", bin, e);
            None
        }
    };
    debug!(bin, version = ?version, "Resolved binary version");

    if let Ok(mut versions) = BIN_VERSIONS.lock() {
        versions.insert(key, version.clone());
    }
    version
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Renders an option value the way it appears on a command line.
pub(crate) fn option_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One option variant of a configured command-line worker.
#[derive(Debug)]
pub struct CommandWorker {
    definition: Arc<WorkerDefinition>,
    options: BTreeMap<String, Value>,
    timeout: Option<Duration>,
}

impl CommandWorker {
    pub fn new(definition: Arc<WorkerDefinition>, options: BTreeMap<String, Value>, timeout: Option<Duration>) -> Self {
        Self { definition, options, timeout }
    }

    /// Command-line arguments for optimizing `src` into `dst`.
    pub fn command_args(&self, src: &Path, dst: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(self.definition.args.len());
        for template in &self.definition.args {
            match template {
                ArgTemplate::Plain(template) => args.push(self.substitute(template, src, dst)),
                ArgTemplate::Flag(flag) => {
                    if self.options.get(&flag.when).and_then(Value::as_bool).unwrap_or(false) {
                        args.push(self.substitute(&flag.arg, src, dst));
                    }
                }
            }
        }
        args
    }

    fn substitute(&self, template: &str, src: &Path, dst: &Path) -> String {
        let mut arg = template.to_string();
        for name in placeholders(template) {
            let value = match name.as_str() {
                "src" => src.to_string_lossy().to_string(),
                "dst" => dst.to_string_lossy().to_string(),
                option => self.options.get(option).map(option_to_arg).unwrap_or_default(),
            };
            arg = arg.replace(&format!("{{{name}}}"), &value);
        }
        arg
    }
}

impl Worker for CommandWorker {
    fn kind(&self) -> &str {
        &self.definition.kind
    }

    fn formats(&self) -> &[ImageFormat] {
        &self.definition.formats
    }

    fn run_order(&self) -> i32 {
        self.definition.run_order
    }

    fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    fn default_options(&self) -> &BTreeMap<String, Value> {
        &self.definition.defaults
    }

    fn allow_consecutive(&self) -> &[String] {
        &self.definition.allow_consecutive
    }

    fn bin_versions(&self) -> Vec<BinVersion> {
        vec![BinVersion {
            name: self.definition.bin.clone(),
            version: resolve_version(&self.definition.bin, &self.definition.version_args),
        }]
    }

    fn implementation_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(serde_json::to_vec(&*self.definition).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    fn optimize(&self, src: &Path, dst: &Path) -> bool {
        if self.definition.in_place {
            if let Err(e) = std::fs::copy(src, dst) {
                warn!("{}: cannot copy {} for in-place run: {}", self.kind(), src.display(), e);
                return false;
            }
        }

        let args = self.command_args(src, dst);
        debug!(bin = %self.definition.bin, args = ?args, "Running worker");

        let status = match run_quiet(Command::new(&self.definition.bin).args(&args), self.timeout) {
            Ok(status) => status,
            Err(e) => {
                debug!("{} failed to run: {}", self.kind(), e);
                return false;
            }
        };
        if !status.success() {
            debug!("{} exited with {}", self.kind(), status);
            return false;
        }

        match (std::fs::metadata(src), std::fs::metadata(dst)) {
            (Ok(src_meta), Ok(dst_meta)) => dst_meta.len() > 0 && dst_meta.len() < src_meta.len(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::config::{FlagArg, WorkerConfig};
    use serde_json::json;
    use std::path::PathBuf;

    fn worker(options: BTreeMap<String, Value>) -> CommandWorker {
        let definition = WorkerDefinition {
            kind: "pngquant".to_string(),
            bin: "pngquant".to_string(),
            version_args: vec!["--version".to_string()],
            formats: vec![ImageFormat::PNG],
            run_order: 2,
            args: vec![
                ArgTemplate::Plain("--quality={min}-{max}".to_string()),
                ArgTemplate::Flag(FlagArg { when: "strip".to_string(), arg: "--strip".to_string() }),
                ArgTemplate::Plain("--output".to_string()),
                ArgTemplate::Plain("{dst}".to_string()),
                ArgTemplate::Plain("{src}".to_string()),
            ],
            in_place: false,
            defaults: BTreeMap::from([
                ("min".to_string(), json!(0)),
                ("max".to_string(), json!(100)),
                ("strip".to_string(), json!(false)),
            ]),
            allow_consecutive: vec![],
            variants: BTreeMap::new(),
        };
        CommandWorker::new(Arc::new(definition), options, None)
    }

    #[test]
    fn substitutes_placeholders_and_flags() {
        let w = worker(BTreeMap::from([
            ("min".to_string(), json!(40)),
            ("max".to_string(), json!(80)),
            ("strip".to_string(), json!(true)),
        ]));
        let args = w.command_args(&PathBuf::from("/in/a.png"), &PathBuf::from("/out/b.png"));
        assert_eq!(args, vec!["--quality=40-80", "--strip", "--output", "/out/b.png", "/in/a.png"]);

        let w = worker(BTreeMap::from([
            ("min".to_string(), json!(0)),
            ("max".to_string(), json!(100)),
            ("strip".to_string(), json!(false)),
        ]));
        let args = w.command_args(&PathBuf::from("a"), &PathBuf::from("b"));
        assert_eq!(args, vec!["--quality=0-100", "--output", "b", "a"]);
    }

    #[test]
    fn implementation_digest_ignores_options() {
        let a = worker(BTreeMap::from([("max".to_string(), json!(80))]));
        let b = worker(BTreeMap::from([("max".to_string(), json!(90))]));
        assert_eq!(a.implementation_digest(), b.implementation_digest());
    }

    #[test]
    fn missing_binary_has_no_version_and_fails() {
        let config = WorkerConfig::parse(r#"{"workers": [{
            "kind": "nope", "bin": "definitely-not-an-installed-optimizer",
            "formats": ["png"], "args": ["{src}", "{dst}"]
        }]}"#).unwrap();
        let workers = config.expand(None);
        let versions = workers[0].bin_versions();
        assert_eq!(versions[0].version, None);

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        std::fs::write(&src, b"data").unwrap();
        assert!(!workers[0].optimize(&src, &dir.path().join("b.png")));
    }

    #[test]
    fn renders_option_values() {
        assert_eq!(option_to_arg(&json!("fast")), "fast");
        assert_eq!(option_to_arg(&json!(7)), "7");
        assert_eq!(option_to_arg(&json!(true)), "true");
        assert_eq!(option_to_arg(&Value::Null), "");
    }
}
