//! In-memory implementation of DocumentStorage
//!
//! This implementation is primarily intended for testing and development purposes.
//! All data is lost when the instance is dropped.

use async_trait::async_trait;
use flowdock_core::Document;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{DocumentStorage, DocumentStoreError, DocumentStoreResult};

/// In-memory implementation of DocumentStorage
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStorage {
    document: Arc<RwLock<Option<Document>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryDocumentStorage {
    /// Create an empty store; reads fail with `NotFound` until the first write
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `document`
    pub fn with_document(document: Document) -> Self {
        Self {
            document: Arc::new(RwLock::new(Some(document))),
            ..Self::default()
        }
    }

    /// Make subsequent reads fail, simulating an unreadable document
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Replace the stored document behind the back of any reader
    pub async fn overwrite(&self, document: Document) {
        *self.document.write().await = Some(document);
    }

    /// Last stored document, if any
    pub async fn stored(&self) -> Option<Document> {
        self.document.read().await.clone()
    }
}

#[async_trait]
impl DocumentStorage for MemoryDocumentStorage {
    async fn read(&self) -> DocumentStoreResult<Document> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::BackendError(anyhow::anyhow!("simulated read failure")));
        }

        self.document
            .read()
            .await
            .clone()
            .ok_or_else(|| DocumentStoreError::NotFound(self.describe()))
    }

    async fn write(&self, document: &Document) -> DocumentStoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::BackendError(anyhow::anyhow!("simulated write failure")));
        }

        *self.document.write().await = Some(document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
