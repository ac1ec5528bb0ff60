//! Aggregate statistics per distinct worker chain.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use crate::core::ChainResult;
use super::metrics::{Duration, Speed, WarnLevel, safe_div};

/// Statistics over all chain results sharing one worker id sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStats {
    pub worker_ids: Vec<String>,
    /// Number of chain results (one per image) in this group
    pub count: usize,
    pub original_size: u64,
    pub optimized_size: u64,
    /// `optimized_size / original_size` over the whole group
    pub ratio: f64,
    /// Mean of the per-image ratios
    pub avg_ratio: f64,
    pub avg_difference: f64,
    pub max_difference: f64,
    pub warn_level: Option<WarnLevel>,
    pub time: Duration,
    pub avg_time: Duration,
    pub speed: Speed,
    /// Worker id -> chains in which that worker succeeded
    pub success_counts: BTreeMap<String, usize>,
    /// Workers of this chain that never succeeded in it
    pub unused_workers: Vec<String>,
}

impl ChainStats {
    /// Builds the statistics for one non-empty group.
    fn from_group(worker_ids: Vec<String>, entries: &[&ChainResult]) -> Self {
        let count = entries.len();
        let original_size: u64 = entries.iter().map(|e| e.src_size()).sum();
        let optimized_size: u64 = entries.iter().map(|e| e.dst_size()).sum();
        let time: Duration = entries.iter().map(|e| Duration::from(e.time())).sum();

        let avg_ratio = safe_div(entries.iter().map(|e| e.ratio()).sum(), count as f64);
        let avg_difference = safe_div(entries.iter().map(|e| e.difference).sum(), count as f64);
        let max_difference = entries
            .iter()
            .map(|e| e.difference)
            .fold(0.0, f64::max);

        let mut success_counts: BTreeMap<String, usize> =
            worker_ids.iter().map(|id| (id.clone(), 0)).collect();
        for entry in entries {
            let mut succeeded: Vec<&str> = entry
                .steps
                .iter()
                .filter(|s| s.success)
                .map(|s| s.worker_id.as_str())
                .collect();
            succeeded.sort_unstable();
            succeeded.dedup();
            for id in succeeded {
                *success_counts.entry(id.to_string()).or_default() += 1;
            }
        }

        let mut unused_workers: Vec<String> = Vec::new();
        for id in &worker_ids {
            if success_counts.get(id).copied().unwrap_or(0) == 0 && !unused_workers.contains(id) {
                unused_workers.push(id.clone());
            }
        }

        Self {
            ratio: if original_size == 0 { 1.0 } else { optimized_size as f64 / original_size as f64 },
            avg_time: Duration::new_unchecked(safe_div(time.as_secs_f64(), count as f64)),
            speed: Speed::from_savings(original_size, optimized_size, time),
            warn_level: WarnLevel::from_max_difference(max_difference),
            worker_ids,
            count,
            original_size,
            optimized_size,
            avg_ratio,
            avg_difference,
            max_difference,
            time,
            success_counts,
            unused_workers,
        }
    }
}

/// Groups chain results by worker sequence and orders them for reporting.
pub struct StatsAggregator;

impl StatsAggregator {
    /// One [`ChainStats`] per distinct worker sequence, smallest output
    /// first and faster first among equal sizes.
    pub fn aggregate(results: &[ChainResult]) -> Vec<ChainStats> {
        let mut groups: BTreeMap<Vec<String>, Vec<&ChainResult>> = BTreeMap::new();
        for result in results {
            groups.entry(result.worker_ids()).or_default().push(result);
        }

        let mut stats: Vec<ChainStats> = groups
            .into_iter()
            .map(|(worker_ids, entries)| ChainStats::from_group(worker_ids, &entries))
            .collect();

        // The group map iterates in worker-id order, which keeps full ties stable.
        stats.sort_by(|a, b| {
            a.optimized_size
                .cmp(&b.optimized_size)
                .then_with(|| a.time.as_secs_f64().total_cmp(&b.time.as_secs_f64()))
        });

        debug!(results = results.len(), chains = stats.len(), "Aggregated chain stats");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepResult;

    fn step(id: &str, success: bool, src: u64, dst: u64, ms: u64) -> StepResult {
        StepResult {
            worker_id: id.to_string(),
            success,
            time: std::time::Duration::from_millis(ms),
            src_size: src,
            dst_size: success.then_some(dst),
            cache_key: None,
        }
    }

    fn chain(steps: Vec<StepResult>, difference: f64) -> ChainResult {
        ChainResult { steps, difference }
    }

    #[test]
    fn groups_by_exact_sequence_and_sorts_by_size_then_time() {
        let results = vec![
            chain(vec![step("a", true, 1000, 800, 10)], 0.0),
            chain(vec![step("b", true, 1000, 900, 10)], 0.0),
            chain(vec![step("a", true, 1000, 800, 10), step("b", true, 800, 700, 10)], 0.02),
            chain(vec![step("a", true, 2000, 1500, 30)], 0.004),
            chain(vec![step("c", true, 1000, 900, 5)], 0.0),
        ];
        let stats = StatsAggregator::aggregate(&results);

        let order: Vec<Vec<String>> = stats.iter().map(|s| s.worker_ids.clone()).collect();
        assert_eq!(order, vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
            vec!["b".to_string()],
            vec!["a".to_string()],
        ]);

        let a = &stats[3];
        assert_eq!(a.count, 2);
        assert_eq!(a.original_size, 3000);
        assert_eq!(a.optimized_size, 2300);
        assert!((a.ratio - 2300.0 / 3000.0).abs() < 1e-12);
        assert!((a.avg_ratio - (0.8 + 0.75) / 2.0).abs() < 1e-12);
        assert!((a.avg_difference - 0.002).abs() < 1e-12);
        assert_eq!(a.max_difference, 0.004);
        assert_eq!(a.warn_level, Some(WarnLevel::Low));
        assert!((a.time.as_secs_f64() - 0.04).abs() < 1e-9);
        assert!((a.avg_time.as_secs_f64() - 0.02).abs() < 1e-9);
        assert!(matches!(a.speed, Speed::Finite(s) if (s - 700.0 / 0.04).abs() < 1e-6));

        assert_eq!(stats[0].warn_level, Some(WarnLevel::Medium));
    }

    #[test]
    fn flags_workers_that_never_succeed() {
        let results = vec![
            chain(vec![step("a", true, 100, 90, 1), step("b", false, 90, 0, 1)], 0.0),
            chain(vec![step("a", false, 50, 0, 1), step("b", false, 50, 0, 1)], 0.0),
        ];
        let stats = StatsAggregator::aggregate(&results);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].success_counts["a"], 1);
        assert_eq!(stats[0].success_counts["b"], 0);
        assert_eq!(stats[0].unused_workers, vec!["b".to_string()]);
        assert_eq!(stats[0].optimized_size, 140);
    }

    #[test]
    fn zero_time_savings_are_unbounded() {
        let results = vec![chain(vec![step("a", true, 100, 50, 0)], 0.0)];
        let stats = StatsAggregator::aggregate(&results);
        assert_eq!(stats[0].speed, Speed::Unbounded);

        let results = vec![chain(vec![step("a", false, 100, 0, 0)], 0.0)];
        let stats = StatsAggregator::aggregate(&results);
        assert_eq!(stats[0].speed, Speed::Finite(0.0));
        assert_eq!(stats[0].ratio, 1.0);
    }
}
