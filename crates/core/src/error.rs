//! Error types for Hivemind.
//!
//! This module defines a unified error enum covering every failure category
//! the expert-routing core can produce: input validation, unknown ids,
//! ownership mismatches, provider (LLM/embedding) failures and storage
//! failures, plus configuration, I/O, prompt and serialization errors.

use thiserror::Error;

/// Unified error type for Hivemind.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input shape or status value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ownership mismatch
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Embedding or generation provider failed or returned malformed data
    #[error("LLM error: {0}")]
    Llm(String),

    /// Transactional storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error should be surfaced to the caller as a rejected
    /// operation rather than an internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::NotFound(_) | AppError::Unauthorized(_)
        )
    }

    /// HTTP-equivalent status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(AppError::Validation("bad".into()).is_client_error());
        assert!(AppError::NotFound("x".into()).is_client_error());
        assert!(AppError::Unauthorized("x".into()).is_client_error());
        assert!(!AppError::Llm("down".into()).is_client_error());
        assert!(!AppError::Storage("locked".into()).is_client_error());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("bad".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Storage("x".into()).status_code(), 500);
    }
}
