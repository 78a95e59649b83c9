//! services/api/src/error.rs
//!
//! Defines the error types for the API service.

use crate::config::ConfigError;
use crate::session::SessionMode;
use axum::http::StatusCode;
use companion_core::ports::PortError;
use uuid::Uuid;

/// Errors raised by the session lifecycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),

    /// The requested lifecycle change is not allowed from the current mode.
    #[error("Cannot {action} a session that is {from:?}")]
    InvalidTransition {
        from: SessionMode,
        action: &'static str,
    },

    #[error("Session {0} is not active")]
    NotActive(Uuid),
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::InvalidTransition { .. } | SessionError::NotActive(_) => {
                StatusCode::CONFLICT
            }
        }
    }
}

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Session Error: {0}")]
    Session(#[from] SessionError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
