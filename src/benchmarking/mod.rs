//! Statistics over explored chains and the per-format reports.

mod metrics;
mod reporter;
mod stats;

pub use metrics::{Duration, Percentage, Speed, WarnLevel};
pub use reporter::FormatReporter;
pub use stats::{ChainStats, StatsAggregator};
