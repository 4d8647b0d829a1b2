//! Error types for model-eval operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::tensor::DType;

/// Result type alias for model-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scoring or predicting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A tensor has the wrong rank or dimensions.
    #[error("Shape error: {tensor}: expected {expected}, got {actual}")]
    Shape {
        /// Name of the offending tensor.
        tensor: String,
        /// Expected shape constraint.
        expected: String,
        /// Actual shape.
        actual: String,
    },

    /// A tensor is not floating point where floating point is required.
    #[error("Type error: {tensor} must be a floating point tensor, got {dtype}")]
    DType {
        /// Name of the offending tensor.
        tensor: String,
        /// Actual element type.
        dtype: DType,
    },

    /// A configuration mapping contains parameters nobody understands.
    #[error("{context} {unknown:?} (allowed: {allowed:?})")]
    UnknownParams {
        /// Who rejected the parameters.
        context: String,
        /// Parameter names that are not recognized.
        unknown: Vec<String>,
        /// Parameter names that are recognized.
        allowed: Vec<String>,
    },

    /// Unrecognized ensemble type name.
    #[error("Unknown ensemble type: {name} (expected one of: mean, gmean, log_mean)")]
    UnknownEnsembleType {
        /// The rejected name.
        name: String,
    },

    /// Neither a graph nor a graph provider was supplied.
    #[error("If no graph is supplied, a default graph provider must be given")]
    MissingGraph,

    /// Other invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to obtain a frozen graph artifact.
    #[error("Graph load failed: {source_name}: {reason}")]
    GraphLoad {
        /// Where the graph was being loaded from.
        source_name: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Failed to download a graph tarball.
    #[error("Download failed: {url}: {reason}")]
    Download {
        /// URL being fetched.
        url: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The tensor engine failed while executing a forward pass.
    #[error("Execution failed ({stage}): {message}")]
    Execution {
        /// What was being executed.
        stage: String,
        /// Error message from the engine.
        message: String,
    },

    /// A matrix decomposition did not converge.
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    /// Error importing CSV data.
    #[error("CSV import error at line {line}: {reason}")]
    CsvImport {
        /// Line number where the error occurred.
        line: usize,
        /// Reason for the failure.
        reason: String,
    },

    /// Failed to restore model weights.
    #[error("Checkpoint restore failed: {}: {reason}", .path.display())]
    Restore {
        /// Checkpoint location.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// ndarray shape error.
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Build a [`Error::Shape`] from displayable parts.
    pub fn shape(
        tensor: impl Into<String>,
        expected: impl Into<String>,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::Shape {
            tensor: tensor.into(),
            expected: expected.into(),
            actual: format!("{actual:?}"),
        }
    }
}
