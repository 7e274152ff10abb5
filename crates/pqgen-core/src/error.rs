//! Error types for pqgen core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PqgenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Schema has no entities")]
    EmptySchema,

    #[error("No valid entities for merge with `{entity}`")]
    NoMergeableEntity { entity: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PqgenError {
    /// Whether the error stems from the schema or configuration rather than a
    /// particular build attempt.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PqgenError::ConfigError(_)
                | PqgenError::InvalidSchema(_)
                | PqgenError::SerializationError(_)
                | PqgenError::EmptySchema
        )
    }
}

pub type Result<T> = std::result::Result<T, PqgenError>;

impl From<anyhow::Error> for PqgenError {
    fn from(err: anyhow::Error) -> Self {
        PqgenError::InternalError(err.to_string())
    }
}
