//! Core domain values.
//!
//! - [`ImagePath`]: an image file with memoized digest and etag
//! - [`StepResult`]: outcome of one worker application
//! - [`ChainResult`]: one explored chain of steps on a source image

mod image;
mod types;

pub use image::{ImageEtag, ImagePath, digest_bytes, digest_file};
pub use types::{ChainResult, StepResult};
