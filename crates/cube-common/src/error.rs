//! Error types for data cube operations.

use thiserror::Error;

/// Result type alias using CubeError.
pub type CubeResult<T> = Result<T, CubeError>;

/// Primary error type shared by every crate of the workspace.
#[derive(Debug, Error)]
pub enum CubeError {
    // === Recipe Errors ===
    #[error("Invalid recipe: {0}")]
    Recipe(String),

    #[error("Malformed document: {0}")]
    Document(String),

    // === Schema Errors ===
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Measurement sets differ: {left:?} vs {right:?}")]
    SchemaMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("Measurement names collide: {0:?}")]
    NameCollision(Vec<String>),

    #[error("Empty measurement set requested for product '{0}'")]
    EmptyMeasurementSet(String),

    // === Evaluation Errors ===
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("No usable no-data value for '{measurement}': {message}")]
    NoDataPolicy { measurement: String, message: String },

    // === Collaborator Errors ===
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not implemented: {0}")]
    Unimplemented(String),
}

impl CubeError {
    pub fn recipe(message: impl Into<String>) -> Self {
        CubeError::Recipe(message.into())
    }

    pub fn missing_input(message: impl Into<String>) -> Self {
        CubeError::MissingInput(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        CubeError::Evaluation(message.into())
    }

    pub fn no_data_policy(measurement: impl Into<String>, message: impl Into<String>) -> Self {
        CubeError::NoDataPolicy {
            measurement: measurement.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CubeError::Recipe(_) => "RecipeError",
            CubeError::Document(_) => "DocumentError",
            CubeError::MissingInput(_) => "MissingInputError",
            CubeError::SchemaMismatch { .. } => "SchemaMismatchError",
            CubeError::NameCollision(_) => "NameCollisionError",
            CubeError::EmptyMeasurementSet(_) => "EmptyMeasurementSetError",
            CubeError::Evaluation(_) => "EvaluationError",
            CubeError::NoDataPolicy { .. } => "NoDataPolicyError",
            CubeError::Catalog(_) => "CatalogError",
            CubeError::Storage(_) => "StorageError",
            CubeError::Unimplemented(_) => "Unimplemented",
        }
    }
}

// Conversion from common error types
impl From<serde_yaml::Error> for CubeError {
    fn from(err: serde_yaml::Error) -> Self {
        CubeError::Document(format!("YAML error: {}", err))
    }
}

impl From<serde_json::Error> for CubeError {
    fn from(err: serde_json::Error) -> Self {
        CubeError::Document(format!("JSON error: {}", err))
    }
}
