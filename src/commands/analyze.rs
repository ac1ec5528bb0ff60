//! Whole-run orchestration: validate inputs, explore each image, report per format.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use crate::benchmarking::{FormatReporter, StatsAggregator};
use crate::cache::{CacheStore, ImageStore};
use crate::core::{ChainResult, ImagePath};
use crate::processing::{DifferenceEstimator, ImageOps, WorkerRunner};
use crate::utils::{BenchError, BenchResult, ImageFormat, ValidationError, is_input_rejection, validate_input_path};
use crate::worker::WorkerVariant;

/// Inputs grouped by detected format, in first-seen order within a format.
pub type Inputs = BTreeMap<ImageFormat, Vec<ImagePath>>;

/// Runs chain exploration over a set of images.
///
/// Each image is explored on the blocking pool with its own [`WorkerRunner`];
/// at most `jobs` explorations run at the same time. The cache and image
/// store are shared between them.
pub struct Analysis {
    cache: Arc<CacheStore>,
    store: ImageStore,
    estimator: Arc<DifferenceEstimator>,
    workers: Vec<WorkerVariant>,
    semaphore: Arc<Semaphore>,
    jobs: usize,
}

impl Analysis {
    pub fn new(
        cache: Arc<CacheStore>,
        store: ImageStore,
        ops: Box<dyn ImageOps>,
        workers: Vec<WorkerVariant>,
        jobs: usize,
    ) -> Self {
        let jobs = jobs.max(1);
        let estimator = DifferenceEstimator::new(Arc::clone(&cache), store.clone(), ops);
        Self {
            cache,
            store,
            estimator: Arc::new(estimator),
            workers,
            semaphore: Arc::new(Semaphore::new(jobs)),
            jobs,
        }
    }

    pub fn workers(&self) -> &[WorkerVariant] {
        &self.workers
    }

    /// Workers handling `format`, in configuration order.
    pub fn workers_for(&self, format: ImageFormat) -> Vec<WorkerVariant> {
        self.workers
            .iter()
            .filter(|w| w.handles(format))
            .cloned()
            .collect()
    }

    /// Validates `paths` and groups the usable ones by format.
    ///
    /// Missing files, non-files, unrecognized content and formats without
    /// any worker are skipped with a warning. Repeated paths count once.
    pub fn collect_inputs(&self, paths: &[PathBuf]) -> BenchResult<Inputs> {
        let mut inputs = Inputs::new();
        for path in paths {
            let format = match validate_input_path(path) {
                Ok(format) => format,
                Err(e) if is_input_rejection(&e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !self.workers.iter().any(|w| w.handles(format)) {
                let e = BenchError::from(ValidationError::NoWorkers {
                    path: path.clone(),
                    format: format.to_string(),
                });
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }

            let images = inputs.entry(format).or_default();
            let image = ImagePath::new(path);
            if !images.contains(&image) {
                images.push(image);
            }
        }

        for (format, images) in &inputs {
            let ids: Vec<String> = self.workers_for(*format).iter().map(|w| w.id.clone()).collect();
            info!(
                format = %format,
                images = images.len(),
                "Workers for {}: {}",
                format,
                ids.join(", ")
            );
        }
        Ok(inputs)
    }

    /// Explores every input image, returning all chain results per format.
    ///
    /// A failed comparison aborts the whole analysis.
    pub async fn explore(&self, inputs: Inputs) -> BenchResult<BTreeMap<ImageFormat, Vec<ChainResult>>> {
        let total: usize = inputs.values().map(Vec::len).sum();
        info!(images = total, jobs = self.jobs, "Starting exploration");

        let mut handles = Vec::with_capacity(total);
        for (format, images) in inputs {
            let workers = Arc::new(self.workers_for(format));
            for image in images {
                let permit = Arc::clone(&self.semaphore).acquire_owned().await.map_err(|e| {
                    warn!("Failed to acquire exploration slot: {}", e);
                    BenchError::io(format!("Failed to acquire exploration slot: {e}"))
                })?;
                debug!(
                    image = %image,
                    available = self.semaphore.available_permits(),
                    "Exploration slot acquired"
                );

                let cache = Arc::clone(&self.cache);
                let store = self.store.clone();
                let estimator = Arc::clone(&self.estimator);
                let workers = Arc::clone(&workers);
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    explore_image(&cache, &store, &estimator, &image, &workers)
                });
                handles.push((format, handle));
            }
        }

        let mut results: BTreeMap<ImageFormat, Vec<ChainResult>> = BTreeMap::new();
        for (format, handle) in handles {
            let chains = handle
                .await
                .map_err(|e| BenchError::io(format!("Exploration task panicked: {e}")))??;
            results.entry(format).or_default().extend(chains);
        }
        Ok(results)
    }

    /// Full run: inputs to written reports, one per format.
    pub async fn run(&self, paths: &[PathBuf], report_dir: &Path) -> BenchResult<Vec<FormatReporter>> {
        let inputs = self.collect_inputs(paths)?;
        if inputs.is_empty() {
            warn!("No usable input images");
            return Ok(Vec::new());
        }

        let image_counts: BTreeMap<ImageFormat, usize> =
            inputs.iter().map(|(format, images)| (*format, images.len())).collect();
        let results = self.explore(inputs).await?;

        let mut reporters = Vec::with_capacity(results.len());
        for (format, chains) in results {
            let stats = StatsAggregator::aggregate(&chains);
            let image_count = image_counts.get(&format).copied().unwrap_or(0);
            let reporter = FormatReporter::new(format, image_count, stats);
            reporter.write(report_dir)?;
            reporters.push(reporter);
        }
        Ok(reporters)
    }
}

fn explore_image(
    cache: &CacheStore,
    store: &ImageStore,
    estimator: &DifferenceEstimator,
    image: &ImagePath,
    workers: &[WorkerVariant],
) -> BenchResult<Vec<ChainResult>> {
    info!(image = %image, workers = workers.len(), "Exploring image");
    let mut runner = WorkerRunner::new(cache, store, estimator);
    let chains = runner.run(image, workers)?;
    info!(image = %image, chains = chains.len(), "Finished image");
    Ok(chains)
}
