//! Error types for the Flowdock Server
//!
//! This module contains the error types used throughout the server.

use flowdock_core::ValidationError;
use flowdock_document_store::DocumentStoreError;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Rejected component definition
    #[error("{0}")]
    ValidationError(#[from] ValidationError),

    /// Malformed request that never reached validation
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Document storage error
    #[error("Document store error: {0}")]
    DocumentStoreError(#[from] DocumentStoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(format!("IO error: {}", err))
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::InternalError(format!("Registration task failed: {}", err))
    }
}
