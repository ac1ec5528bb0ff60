//! Results of applying workers to images.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of applying one worker variant to one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Id of the worker variant that ran
    pub worker_id: String,
    /// Whether the worker produced a smaller image
    pub success: bool,
    /// Wall time spent in the worker
    pub time: Duration,
    /// Size of the input image in bytes
    pub src_size: u64,
    /// Size of the output image, only set on success
    pub dst_size: Option<u64>,
    /// Store-relative path of the persisted output, only set on success
    pub cache_key: Option<String>,
}

impl StepResult {
    /// Size of the image the next step operates on.
    pub fn size_after(&self) -> u64 {
        match (self.success, self.dst_size) {
            (true, Some(size)) => size,
            _ => self.src_size,
        }
    }
}

/// One explored chain of worker applications on a single source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResult {
    pub steps: Vec<StepResult>,
    /// Distortion of the chain's final image relative to the source
    pub difference: f64,
}

impl ChainResult {
    pub fn worker_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.worker_id.clone()).collect()
    }

    pub fn time(&self) -> Duration {
        self.steps.iter().map(|s| s.time).sum()
    }

    pub fn src_size(&self) -> u64 {
        self.steps.first().map_or(0, |s| s.src_size)
    }

    pub fn dst_size(&self) -> u64 {
        self.steps.last().map_or(0, StepResult::size_after)
    }

    /// `dst_size / src_size`, 1.0 for an empty source.
    pub fn ratio(&self) -> f64 {
        let src = self.src_size();
        if src == 0 {
            1.0
        } else {
            self.dst_size() as f64 / src as f64
        }
    }
}
