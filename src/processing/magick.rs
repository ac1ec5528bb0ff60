//! External image-processing commands used to prepare and compare images.

use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use crate::utils::{BenchError, BenchResult, run_captured};

/// Image operations the difference estimator needs, run as external processes.
///
/// Exit status and standard output are the whole contract.
pub trait ImageOps: Send + Sync {
    /// Number of frames in `image`.
    fn frame_count(&self, image: &Path) -> BenchResult<usize>;

    /// Whether any frame of `image` carries an alpha channel.
    fn has_alpha(&self, image: &Path) -> BenchResult<bool>;

    /// Writes all frames of `src`, coalesced and stacked, as one image to `dst`.
    fn flatten(&self, src: &Path, dst: &Path) -> BenchResult<()>;

    /// Writes `src` composited over a fixed pseudo-random noise pattern to `dst`.
    fn over_noise(&self, src: &Path, dst: &Path) -> BenchResult<()>;

    /// Normalized root-mean-square distortion between two images.
    fn distortion(&self, a: &Path, b: &Path) -> BenchResult<f64>;
}

/// [`ImageOps`] backed by ImageMagick's `convert` and `identify`.
#[derive(Debug, Clone)]
pub struct MagickOps {
    convert: String,
    identify: String,
    timeout: Option<Duration>,
}

impl Default for MagickOps {
    fn default() -> Self {
        Self::new("convert", "identify", None)
    }
}

impl MagickOps {
    pub fn new(convert: impl Into<String>, identify: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            convert: convert.into(),
            identify: identify.into(),
            timeout,
        }
    }

    fn run(&self, program: &str, args: &[&str]) -> BenchResult<Output> {
        debug!(program, args = ?args, "Running image tool");
        let output = run_captured(Command::new(program).args(args), self.timeout)
            .map_err(|e| BenchError::command(format!("{program}: {e}")))?;
        if !output.status.success() {
            return Err(BenchError::command(format!(
                "{} {} exited with {}: {}",
                program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    fn identify_format(&self, image: &Path, format: &str) -> BenchResult<String> {
        let image = path_arg(image)?;
        let output = self.run(&self.identify, &["-format", format, image])?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ImageOps for MagickOps {
    fn frame_count(&self, image: &Path) -> BenchResult<usize> {
        let text = self.identify_format(image, "%n\n")?;
        parse_frame_count(&text)
            .ok_or_else(|| BenchError::command(format!("Unexpected frame count for {}: {:?}", image.display(), text)))
    }

    fn has_alpha(&self, image: &Path) -> BenchResult<bool> {
        let text = self.identify_format(image, "%A\n")?;
        Ok(parse_alpha(&text))
    }

    fn flatten(&self, src: &Path, dst: &Path) -> BenchResult<()> {
        self.run(&self.convert, &[path_arg(src)?, "-coalesce", "-append", path_arg(dst)?])?;
        Ok(())
    }

    fn over_noise(&self, src: &Path, dst: &Path) -> BenchResult<()> {
        self.run(&self.convert, &[
            path_arg(src)?,
            "-auto-orient",
            "(", "+clone", "-alpha", "off", "-fill", "gray50", "-colorize", "100",
            "-seed", "42", "+noise", "Random", ")",
            "+swap", "-compose", "over", "-composite", "-alpha", "off",
            path_arg(dst)?,
        ])?;
        Ok(())
    }

    fn distortion(&self, a: &Path, b: &Path) -> BenchResult<f64> {
        let output = self.run(&self.convert, &[
            path_arg(a)?, "-auto-orient",
            path_arg(b)?, "-auto-orient",
            "-metric", "RMSE", "-compare",
            "-format", "%[distortion]", "info:",
        ])?;
        let text = String::from_utf8_lossy(&output.stdout);
        parse_distortion(&text)
            .ok_or_else(|| BenchError::command(format!("Unexpected distortion output: {:?}", text)))
    }
}

fn path_arg(path: &Path) -> BenchResult<&str> {
    path.to_str()
        .ok_or_else(|| BenchError::command(format!("Path is not valid UTF-8: {}", path.display())))
}

/// `%n` prints the frame count once per frame; the first line is enough.
fn parse_frame_count(text: &str) -> Option<usize> {
    text.lines().map(str::trim).find(|l| !l.is_empty())?.parse().ok()
}

/// `%A` prints one alpha state per frame, e.g. `True`, `False`, `Blend`.
fn parse_alpha(text: &str) -> bool {
    text.split_whitespace()
        .any(|state| matches!(state.to_ascii_lowercase().as_str(), "true" | "blend"))
}

fn parse_distortion(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}
