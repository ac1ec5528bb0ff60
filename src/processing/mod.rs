//! Chain exploration and image comparison.
//!
//! - [`WorkerRunner`]: explores worker chains on one image
//! - [`DifferenceEstimator`]: normalized, memoized distortion between images
//! - [`ImageOps`]: external image-processing commands, [`MagickOps`] for ImageMagick

mod difference;
mod magick;
mod runner;

pub use difference::DifferenceEstimator;
pub use magick::{ImageOps, MagickOps};
pub use runner::WorkerRunner;
