//! Error types for empirical_lsm

use thiserror::Error;

/// Result type alias for empirical_lsm operations
pub type Result<T> = std::result::Result<T, LsmError>;

/// Main error type for lagging, windowing and wrapped-model operations
#[derive(Error, Debug)]
pub enum LsmError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Usage error: {0}")]
    UsageError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Missing input data: {0}")]
    MissingInput(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for LsmError {
    fn from(err: polars::error::PolarsError) -> Self {
        LsmError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for LsmError {
    fn from(err: serde_json::Error) -> Self {
        LsmError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for LsmError {
    fn from(err: ndarray::ShapeError) -> Self {
        LsmError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
