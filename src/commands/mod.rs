//! Command-level operations driven by the binary.
//!
//! - [`Analysis`]: validates inputs, explores every image and writes the per-format reports

mod analyze;

pub use analyze::{Analysis, Inputs};
