//! Error types for the chain benchmark.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.

use std::io;
use std::path::PathBuf;
use std::sync::PoisonError;
use thiserror::Error;

/// Validation errors for input images.
///
/// These never abort a run: the offending input is skipped with a warning.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Path-related validation error
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    /// File is not an image format we know how to handle
    #[error("Unrecognized image format: {0}")]
    UnknownFormat(PathBuf),
    /// No configured worker handles the image's format
    #[error("No workers for {format} image: {path}")]
    NoWorkers { path: PathBuf, format: String },
}

/// File path errors.
#[derive(Error, Debug)]
pub enum PathError {
    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    /// Path exists but is not a file
    #[error("Not a file: {0}")]
    NotFile(PathBuf),
    /// IO error accessing the path
    #[error("IO error: {0}")]
    IO(String),
}

/// Main error type for the benchmark.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Input validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Worker configuration is malformed
    #[error("Config error: {0}")]
    Config(String),

    /// Distortion computation between two images failed
    #[error("Comparing {a} with {b} failed: {message}")]
    Comparison {
        a: PathBuf,
        b: PathBuf,
        message: String,
    },

    /// External image tool failed outside of a comparison
    #[error("Command error: {0}")]
    Command(String),

    /// Cache database error
    #[error("Cache error: {0}")]
    Cache(String),

    /// File IO error
    #[error("IO error: {0}")]
    IO(String),

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience result type for benchmark operations.
pub type BenchResult<T> = Result<T, BenchError>;

// Helper methods for error creation
impl BenchError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn command<T: Into<String>>(msg: T) -> Self {
        Self::Command(msg.into())
    }

    pub fn cache<T: Into<String>>(msg: T) -> Self {
        Self::Cache(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        Self::IO(msg.into())
    }

    pub fn comparison(a: impl Into<PathBuf>, b: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Comparison {
            a: a.into(),
            b: b.into(),
            message: message.into(),
        }
    }
}

// Helper methods for validation error creation
impl ValidationError {
    pub fn path_not_found(path: impl Into<PathBuf>) -> Self {
        Self::Path(PathError::NotFound(path.into()))
    }

    pub fn not_a_file(path: impl Into<PathBuf>) -> Self {
        Self::Path(PathError::NotFile(path.into()))
    }
}

impl From<io::Error> for BenchError {
    fn from(err: io::Error) -> Self {
        Self::IO(err.to_string())
    }
}

impl From<io::Error> for PathError {
    fn from(err: io::Error) -> Self {
        Self::IO(err.to_string())
    }
}

impl From<PathError> for BenchError {
    fn from(err: PathError) -> Self {
        Self::Validation(ValidationError::Path(err))
    }
}

impl From<rusqlite::Error> for BenchError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl<T> From<PoisonError<T>> for BenchError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Cache("cache connection lock is poisoned".to_string())
    }
}
