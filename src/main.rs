//! image-optim-bench: explores chains of image optimizers and reports how
//! each ordering trades size against time and distortion.
//!
//! # Usage
//!
//! ```text
//! image-optim-bench [OPTIONS] <IMAGES>...
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use image_optim_bench_lib::cache::CACHE_FILENAME;
use image_optim_bench_lib::utils::ensure_dir;
use image_optim_bench_lib::{Analysis, CacheStore, ImageStore, MagickOps, WorkerConfig, WorkerVariant};

/// Benchmark every admissible chain of image optimization workers.
///
/// Each input image is run through all orderings of the configured workers
/// that respect their run order; results are cached under the work directory
/// and summarized per image format.
#[derive(Parser, Debug)]
#[command(name = "image-optim-bench", version)]
struct Cli {
    /// Images to analyze.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Worker configuration file (JSON).
    #[arg(long, default_value = "config/workers.json")]
    config: PathBuf,

    /// Directory holding the cache database and stored images.
    #[arg(long, default_value = "tmp/worker-analysis")]
    work_dir: PathBuf,

    /// Directory the per-format reports are written to.
    #[arg(long, default_value = ".")]
    report_dir: PathBuf,

    /// Number of images explored in parallel.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    jobs: usize,

    /// ImageMagick `convert` program.
    #[arg(long, default_value = "convert")]
    convert: String,

    /// ImageMagick `identify` program.
    #[arg(long, default_value = "identify")]
    identify: String,

    /// Kill external tools running longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)         // Remove file path
        .with_line_number(false)  // Remove line numbers
        .with_thread_ids(false)   // Remove thread IDs
        .with_thread_names(false) // Remove thread names
        .with_target(false)       // Remove module path
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("=== Worker Analysis Starting ===");
    let timeout = cli.timeout_secs.map(Duration::from_secs);

    let config = WorkerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load worker config {}", cli.config.display()))?;

    // Version queries spawn processes, keep them off the async workers.
    let workers = tokio::task::spawn_blocking(move || {
        config
            .expand(timeout)
            .into_iter()
            .map(WorkerVariant::new)
            .collect::<Vec<_>>()
    })
    .await
    .context("Failed to resolve worker versions")?;
    for worker in &workers {
        debug!(worker = %worker, bin_versions = ?worker.etag.bin_versions, "Worker variant");
    }
    info!("Loaded {} worker variants", workers.len());

    ensure_dir(&cli.work_dir)
        .with_context(|| format!("Failed to create work dir {}", cli.work_dir.display()))?;
    let cache = CacheStore::open(cli.work_dir.join(CACHE_FILENAME)).context("Failed to open cache")?;
    let store = ImageStore::open(&cli.work_dir).context("Failed to open image store")?;
    let ops = MagickOps::new(cli.convert, cli.identify, timeout);

    let analysis = Analysis::new(Arc::new(cache), store, Box::new(ops), workers, cli.jobs);
    let reporters = analysis.run(&cli.images, &cli.report_dir).await?;

    for reporter in &reporters {
        println!("{reporter}");
    }
    info!("Wrote {} reports to {}", reporters.len(), cli.report_dir.display());
    Ok(())
}
