pub mod error;
pub mod validation;
pub mod formats;
pub mod fs;
pub mod process;

pub use error::{BenchError, BenchResult, PathError, ValidationError};
pub use validation::{validate_input_path, is_input_rejection};
pub use formats::ImageFormat;
pub use fs::{get_file_size, ensure_dir};
pub use process::{run_captured, run_quiet};
