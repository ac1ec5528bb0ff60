// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod cache;
pub mod worker;
pub mod processing;
pub mod benchmarking;
pub mod commands;

// Public exports for external consumers
pub use self::core::{ChainResult, ImagePath, StepResult};
pub use utils::{BenchError, BenchResult, ImageFormat};
pub use cache::{CacheStore, ImageStore};
pub use worker::{Worker, WorkerConfig, WorkerVariant};
pub use processing::{DifferenceEstimator, ImageOps, MagickOps, WorkerRunner};
pub use benchmarking::{ChainStats, FormatReporter, StatsAggregator};
pub use commands::Analysis;

// The binary in main.rs is a thin CLI over this library.
