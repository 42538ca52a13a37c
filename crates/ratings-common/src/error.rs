//! Error types shared across the ratings crates

use thiserror::Error;

/// Result type alias for ratings operations
pub type Result<T> = std::result::Result<T, RatingsError>;

/// Domain-level error for the ratings workspace
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatingsError {
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },
}

impl RatingsError {
    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::Validation { field, .. } => field,
        }
    }
}
