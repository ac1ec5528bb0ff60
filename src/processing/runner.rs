//! Chain exploration: every admissible ordering of workers on one image.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};
use crate::cache::{CacheStore, ImageStore};
use crate::core::{ChainResult, ImagePath, StepResult};
use crate::utils::BenchResult;
use crate::worker::{WorkerEtag, WorkerVariant};
use super::difference::DifferenceEstimator;

const NS_STEP: &str = "worker-step";
const NS_CHAINS: &str = "chains";

/// Explores worker chains for one source image at a time.
///
/// From each state every remaining candidate is applied, the resulting
/// prefix is emitted, and the search continues with the candidates that may
/// follow it: never one with the same `cons_id`, never one of a lower
/// `run_order`. Every prefix becomes a [`ChainResult`].
///
/// Worker applications are cached persistently by `(image digest, worker id)`
/// under the worker etag, and memoized for the current exploration so the
/// same intermediate image reached through different prefixes is not
/// looked up twice.
pub struct WorkerRunner<'a> {
    cache: &'a CacheStore,
    store: &'a ImageStore,
    estimator: &'a DifferenceEstimator,
    memo: HashMap<(String, String), (StepResult, ImagePath)>,
}

impl<'a> WorkerRunner<'a> {
    pub fn new(cache: &'a CacheStore, store: &'a ImageStore, estimator: &'a DifferenceEstimator) -> Self {
        Self {
            cache,
            store,
            estimator,
            memo: HashMap::new(),
        }
    }

    /// All chain results for `image`, reusing the previous run's results
    /// wholesale when neither the image nor any worker etag changed.
    pub fn run(&mut self, image: &ImagePath, workers: &[WorkerVariant]) -> BenchResult<Vec<ChainResult>> {
        let mut etags: Vec<&WorkerEtag> = workers.iter().map(|w| &w.etag).collect();
        etags.sort();
        let tag = (image.etag()?, etags);
        let key = image.path().to_string_lossy().into_owned();

        let cache = self.cache;
        cache.get_or_compute(NS_CHAINS, &key, &tag, || self.explore(image, workers))
    }

    /// Explores all chains for `image` without the whole-image shortcut.
    ///
    /// The memo only lives for this call, whether it succeeds or not.
    pub fn explore(&mut self, image: &ImagePath, workers: &[WorkerVariant]) -> BenchResult<Vec<ChainResult>> {
        let candidates: Vec<&WorkerVariant> = workers.iter().collect();
        let mut results = Vec::new();
        let explored = self.run_chains(image, image, &candidates, &[], &mut results);
        self.memo.clear();
        explored?;
        debug!(image = %image, chains = results.len(), "Explored chains");
        Ok(results)
    }

    fn run_chains(
        &mut self,
        original: &ImagePath,
        image: &ImagePath,
        candidates: &[&WorkerVariant],
        chain: &[StepResult],
        results: &mut Vec<ChainResult>,
    ) -> BenchResult<()> {
        for &worker in candidates {
            let (step, next_image) = self.run_worker(image, worker)?;

            let mut steps = Vec::with_capacity(chain.len() + 1);
            steps.extend_from_slice(chain);
            steps.push(step);

            let difference = self.estimator.difference(original, &next_image)?;
            results.push(ChainResult {
                steps: steps.clone(),
                difference,
            });

            let next_candidates: Vec<&WorkerVariant> = candidates
                .iter()
                .copied()
                .filter(|candidate| worker.may_precede(candidate))
                .collect();
            if !next_candidates.is_empty() {
                self.run_chains(original, &next_image, &next_candidates, &steps, results)?;
            }
        }
        Ok(())
    }

    /// Applies `worker` to `image`, returning the step and the image the
    /// chain continues with.
    fn run_worker(&mut self, image: &ImagePath, worker: &WorkerVariant) -> BenchResult<(StepResult, ImagePath)> {
        let key = (image.digest()?.to_string(), worker.id.clone());
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }

        let step = self.cached_step(image, worker, &key)?;
        let next_image = match (&step.cache_key, step.success) {
            (Some(stored), true) => self.store.image(stored),
            _ => image.clone(),
        };

        self.memo.insert(key, (step.clone(), next_image.clone()));
        Ok((step, next_image))
    }

    fn cached_step(&self, image: &ImagePath, worker: &WorkerVariant, key: &(String, String)) -> BenchResult<StepResult> {
        if let Some(step) = self.cache.get::<_, _, StepResult>(NS_STEP, key, &worker.etag)? {
            let reusable = !step.success
                || step.cache_key.as_deref().is_some_and(|stored| self.store.contains(stored));
            if reusable {
                return Ok(step);
            }
            debug!(worker = %worker, "Stored output vanished, running worker again");
        }

        let step = self.apply(image, worker)?;
        self.cache.set(NS_STEP, key, &worker.etag, &step)?;
        Ok(step)
    }

    fn apply(&self, image: &ImagePath, worker: &WorkerVariant) -> BenchResult<StepResult> {
        let src_size = image.size()?;
        let ext = image.extension();
        let dst = self.store.scratch(&ext)?;
        // Hand the worker a free path; some tools refuse to overwrite.
        let _ = std::fs::remove_file(&dst);

        let start = Instant::now();
        let success = worker.optimize(image.path(), &dst);
        let time = start.elapsed();

        debug!(
            worker = %worker,
            image = %image,
            success,
            time = time.as_secs_f64(),
            "Worker applied"
        );

        let failed = StepResult {
            worker_id: worker.id.clone(),
            success: false,
            time,
            src_size,
            dst_size: None,
            cache_key: None,
        };
        if !success {
            return Ok(failed);
        }

        // A worker claiming success without leaving an output behind failed.
        let dst_size = match std::fs::metadata(&dst) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            Ok(_) => {
                warn!(worker = %worker, image = %image, "Worker reported success but left an empty output");
                return Ok(failed);
            }
            Err(e) => {
                warn!(worker = %worker, image = %image, "Worker reported success but left no output: {}", e);
                return Ok(failed);
            }
        };
        let stored = self.store.store(&dst, &ext)?;
        Ok(StepResult {
            worker_id: worker.id.clone(),
            success: true,
            time,
            src_size,
            dst_size: Some(dst_size),
            cache_key: Some(stored),
        })
    }
}
