//! Flowdock Document Store
//!
//! Provides the storage abstraction for the persisted flow document and the
//! [`SharedDocument`] handle that owns the in-memory copy every request
//! handler works against.

use async_trait::async_trait;
use flowdock_core::Document;
use thiserror::Error;

pub mod file;
pub mod memory;
pub mod shared;

pub use file::FileDocumentStorage;
pub use memory::MemoryDocumentStorage;
pub use shared::{Revision, SharedDocument};

/// Errors that can occur during document storage operations
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

impl DocumentStoreError {
    /// Whether the document simply does not exist yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound(_))
    }
}

/// Result type for DocumentStorage operations
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

/// Trait defining the contract for document storage implementations
#[async_trait]
pub trait DocumentStorage: Send + Sync + std::fmt::Debug {
    /// Read and parse the persisted document
    async fn read(&self) -> DocumentStoreResult<Document>;

    /// Replace the persisted document
    async fn write(&self, document: &Document) -> DocumentStoreResult<()>;

    /// Human-readable location, used in logs
    fn describe(&self) -> String;
}
