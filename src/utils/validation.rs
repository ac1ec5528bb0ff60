use std::path::Path;
use crate::utils::{BenchError, BenchResult, ImageFormat, ValidationError};

/// Validates an input image path and returns its detected format.
///
/// Missing paths, non-files and unrecognized content are rejected with a
/// [`ValidationError`] so the caller can skip the input and carry on.
pub fn validate_input_path(path: &Path) -> BenchResult<ImageFormat> {
    if !path.exists() {
        return Err(ValidationError::path_not_found(path).into());
    }

    if !path.is_file() {
        return Err(ValidationError::not_a_file(path).into());
    }

    ImageFormat::detect(path)
}

/// Returns true when the error rejects a single input rather than the whole run.
pub fn is_input_rejection(err: &BenchError) -> bool {
    matches!(err, BenchError::Validation(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_missing_and_directories() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.png");

        let err = validate_input_path(&missing).unwrap_err();
        assert!(is_input_rejection(&err));
        assert!(err.to_string().contains("File not found"));

        let err = validate_input_path(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Not a file"));
    }

    #[test]
    fn detects_format_of_regular_file() {
        let dir = tempdir().unwrap();
        let gif = dir.path().join("anim.bin");
        std::fs::write(&gif, b"GIF89a\x01\0\x01\0\0\0\0").unwrap();
        assert_eq!(validate_input_path(&gif).unwrap(), ImageFormat::GIF);

        let text = dir.path().join("notes.png");
        std::fs::write(&text, b"not really a png").unwrap();
        let err = validate_input_path(&text).unwrap_err();
        assert!(is_input_rejection(&err));
    }
}
