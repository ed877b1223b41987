//! Error types for the explanation-fidelity experiments

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, XaiError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum XaiError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for XaiError {
    fn from(err: polars::error::PolarsError) -> Self {
        XaiError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for XaiError {
    fn from(err: serde_json::Error) -> Self {
        XaiError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for XaiError {
    fn from(err: ndarray::ShapeError) -> Self {
        XaiError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = XaiError::ConfigError("shap_params missing".to_string());
        assert_eq!(err.to_string(), "Configuration error: shap_params missing");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: XaiError = io_err.into();
        assert!(matches!(err, XaiError::IoError(_)));
    }

    #[test]
    fn test_shape_error_from_ndarray() {
        let err: XaiError = ndarray::Array2::<f64>::from_shape_vec((2, 2), vec![1.0])
            .unwrap_err()
            .into();
        assert!(matches!(err, XaiError::ShapeError { .. }));
    }
}
