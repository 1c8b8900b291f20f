//! Error type shared by all services

use crate::db::is_unique_violation;

/// Error types for service operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    /// Missing or invalid credentials
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Account is banned
    #[error("{0}")]
    Banned(String),

    #[error("{0}")]
    Validation(String),

    /// Duplicate of something that must be unique
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// A UNIQUE violation becomes `Conflict(message)`, anything else stays internal
    pub fn from_insert(err: anyhow::Error, message: impl Into<String>) -> Self {
        if is_unique_violation(&err) {
            Self::Conflict(message.into())
        } else {
            Self::Internal(err)
        }
    }
}
