use serde::{Deserialize, Serialize};
use tracing::warn;
use std::fmt;

/// A strongly-typed duration value that ensures non-negative time values
/// and provides safe arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Duration(f64);

impl Duration {
    /// Creates a new Duration without validation, but with safety guards.
    /// Negative or non-finite values are replaced by zero with a warning.
    pub fn new_unchecked(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds < 0.0 {
            warn!("Invalid duration provided: {:.2}s, using 0.0s instead", seconds);
            Self(0.0)
        } else {
            Self(seconds)
        }
    }

    /// Returns the duration in seconds as an f64.
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    /// Returns a Duration representing zero seconds.
    pub fn zero() -> Self {
        Self(0.0)
    }
}

impl Default for Duration {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Self(d.as_secs_f64())
    }
}

impl std::ops::Add for Duration {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::iter::Sum for Duration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, d| acc + d)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 60.0 {
            let minutes = (self.0 / 60.0).floor();
            let seconds = self.0 % 60.0;
            write!(f, "{:.0}m {:.2}s", minutes, seconds)
        } else if self.0 > 0.0 && self.0 < 0.01 {
            write!(f, "{:.2}ms", self.0 * 1000.0)
        } else {
            write!(f, "{:.2}s", self.0)
        }
    }
}

/// A strongly-typed percentage value that ensures values are between 0% and 100%.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percentage(f64);

impl Percentage {
    /// Creates a new Percentage without validation, but with safety guards.
    /// Invalid values will be clamped to valid range with warning logs.
    pub fn new_unchecked(value: f64) -> Self {
        if value < 0.0 {
            warn!("Negative percentage provided: {:.1}%, using 0.0% instead", value);
            Self(0.0)
        } else if value > 100.0 {
            warn!("Percentage exceeds 100%: {:.1}%, capping at 100%", value);
            Self(100.0)
        } else {
            Self(value)
        }
    }

    /// Percentage of a `0.0..=1.0` ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        Self::new_unchecked(ratio * 100.0)
    }

    /// Returns the percentage value as an f64.
    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// Returns a Percentage representing 0%.
    pub fn zero() -> Self {
        Self(0.0)
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Bytes saved per second of worker time.
///
/// Timers can report zero for very fast workers; saving bytes in zero
/// measured time is `Unbounded` rather than a floating-point infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Finite(f64),
    Unbounded,
}

impl Speed {
    pub fn from_savings(original_size: u64, optimized_size: u64, time: Duration) -> Self {
        let saved = original_size as f64 - optimized_size as f64;
        if time.as_secs_f64() > 0.0 {
            Self::Finite(saved / time.as_secs_f64())
        } else if original_size == optimized_size {
            Self::Finite(0.0)
        } else {
            Self::Unbounded
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(bytes_per_sec) => write!(f, "{}/s", format_bytes_f64(*bytes_per_sec)),
            Self::Unbounded => f.write_str("∞"),
        }
    }
}

/// How worrying the worst distortion of a chain is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarnLevel {
    Low,
    Medium,
    High,
}

impl WarnLevel {
    pub fn from_max_difference(max_difference: f64) -> Option<Self> {
        if max_difference >= 0.1 {
            Some(Self::High)
        } else if max_difference >= 0.01 {
            Some(Self::Medium)
        } else if max_difference >= 0.001 {
            Some(Self::Low)
        } else {
            None
        }
    }
}

impl fmt::Display for WarnLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

pub(crate) fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    format_bytes_f64(bytes as f64)
}

fn format_bytes_f64(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let magnitude = bytes.abs();
    if magnitude >= GB {
        format!("{:.2} GB", bytes / GB)
    } else if magnitude >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if magnitude >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{:.0} B", bytes)
    }
}
