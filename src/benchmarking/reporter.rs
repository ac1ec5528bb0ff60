use super::metrics::{Percentage, format_bytes};
use super::stats::ChainStats;
use crate::utils::{BenchResult, ImageFormat, ensure_dir};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Report for all images of one format.
#[derive(Debug, Clone, Serialize)]
pub struct FormatReporter {
    format: ImageFormat,
    image_count: usize,
    stats: Vec<ChainStats>,
}

impl FormatReporter {
    pub fn new(format: ImageFormat, image_count: usize, stats: Vec<ChainStats>) -> Self {
        Self { format, image_count, stats }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn stats(&self) -> &[ChainStats] {
        &self.stats
    }

    /// File stem shared by the text and JSON report.
    pub fn file_stem(&self) -> String {
        format!("worker-analysis-{}", self.format.name())
    }

    /// Writes `<stem>.txt` and `<stem>.json` into `dir`, returning both paths.
    pub fn write(&self, dir: &Path) -> BenchResult<(PathBuf, PathBuf)> {
        ensure_dir(dir)?;
        let stem = self.file_stem();
        let text_path = dir.join(format!("{stem}.txt"));
        let json_path = dir.join(format!("{stem}.json"));

        std::fs::write(&text_path, self.to_string())?;
        std::fs::write(&json_path, serde_json::to_vec_pretty(self)?)?;

        info!(
            format = %self.format,
            chains = self.stats.len(),
            report = %text_path.display(),
            "Report written"
        );
        Ok((text_path, json_path))
    }

    fn write_chain(f: &mut fmt::Formatter<'_>, rank: usize, stats: &ChainStats) -> fmt::Result {
        writeln!(f, "{}. {}", rank, stats.worker_ids.join(" → "))?;
        writeln!(f, "  └── Images: {}", stats.count)?;
        writeln!(f, "  └── Size: {} → {} ({} of original, avg {})",
            format_bytes(stats.original_size),
            format_bytes(stats.optimized_size),
            Percentage::from_ratio(stats.ratio),
            Percentage::from_ratio(stats.avg_ratio),
        )?;
        write!(f, "  └── Difference: avg {:.6}, max {:.6}", stats.avg_difference, stats.max_difference)?;
        match stats.warn_level {
            Some(level) => writeln!(f, " [{} warning]", level)?,
            None => writeln!(f)?,
        }
        writeln!(f, "  └── Time: {} (avg {}/image)", stats.time, stats.avg_time)?;
        writeln!(f, "  └── Speed: {}", stats.speed)?;

        if stats.worker_ids.len() > 1 {
            writeln!(f, "  └── Successes:")?;
            for id in &stats.worker_ids {
                let successes = stats.success_counts.get(id).copied().unwrap_or(0);
                writeln!(f, "      └── {}: {}/{}", id, successes, stats.count)?;
            }
        }
        if !stats.unused_workers.is_empty() {
            writeln!(f, "  └── Never succeeded: {}", stats.unused_workers.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for FormatReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Worker Analysis: {} ===", self.format.name().to_uppercase())?;
        writeln!(f)?;
        writeln!(f, "- Images: {}", self.image_count)?;
        writeln!(f, "- Chains: {}", self.stats.len())?;
        writeln!(f)?;

        if self.stats.is_empty() {
            writeln!(f, "No chains were explored.")?;
            return Ok(());
        }

        for (index, stats) in self.stats.iter().enumerate() {
            Self::write_chain(f, index + 1, stats)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarking::StatsAggregator;
    use crate::core::{ChainResult, StepResult};

    fn result(ids: &[(&str, bool)], src: u64, dst: u64, difference: f64) -> ChainResult {
        let steps = ids
            .iter()
            .map(|(id, success)| StepResult {
                worker_id: id.to_string(),
                success: *success,
                time: std::time::Duration::from_millis(20),
                src_size: src,
                dst_size: success.then_some(dst),
                cache_key: None,
            })
            .collect();
        ChainResult { steps, difference }
    }

    fn reporter() -> FormatReporter {
        let results = vec![
            result(&[("optipng", true)], 2048, 1024, 0.0),
            result(&[("optipng", true), ("advpng", false)], 2048, 1024, 0.05),
        ];
        FormatReporter::new(ImageFormat::PNG, 1, StatsAggregator::aggregate(&results))
    }

    #[test]
    fn renders_text_report() {
        let text = reporter().to_string();
        assert!(text.starts_with("=== Worker Analysis: PNG ==="));
        assert!(text.contains("- Chains: 2"));
        assert!(text.contains("optipng → advpng"));
        assert!(text.contains("2.00 KB → 1.00 KB"));
        assert!(text.contains("[medium warning]"));
        assert!(text.contains("Never succeeded: advpng"));
    }

    #[test]
    fn writes_text_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let (text, json) = reporter().write(dir.path()).unwrap();
        assert_eq!(text.file_name().unwrap(), "worker-analysis-png.txt");
        assert_eq!(json.file_name().unwrap(), "worker-analysis-png.json");

        let parsed: serde_json::Value = serde_json::from_slice(&std::fs::read(json).unwrap()).unwrap();
        assert_eq!(parsed["format"], "png");
        assert_eq!(parsed["image_count"], 1);
        assert_eq!(parsed["stats"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["stats"][0]["worker_ids"][0], "optipng");
    }
}
