//! Unified error type for the forecast service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Artifact error ({artifact}): {message}")]
    Artifact { artifact: String, message: String },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the artifact name to a load failure.
    pub fn artifact(artifact: impl Into<String>, message: impl ToString) -> Self {
        Error::Artifact {
            artifact: artifact.into(),
            message: message.to_string(),
        }
    }

    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::Shape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
