//! Shared in-memory document
//!
//! [`SharedDocument`] is the single owner of the in-memory flow document.
//! Every mutation bumps a revision counter; every successful persist records
//! which revision reached storage. Wholesale replacement from storage can be
//! made conditional on both, so a reload never discards a mutation that has
//! not been written yet.

use flowdock_core::Document;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{DocumentStorage, DocumentStoreResult};

/// Monotonic revision of the in-memory document
pub type Revision = u64;

#[derive(Debug)]
struct State {
    document: Document,
    revision: Revision,
    persisted: Revision,
}

/// Owned, injectable handle to the shared flow document
#[derive(Debug)]
pub struct SharedDocument {
    state: RwLock<State>,
    storage: Arc<dyn DocumentStorage>,
    persist_lock: Mutex<()>,
}

impl SharedDocument {
    /// Wrap a document that is already in sync with `storage`
    pub fn new(document: Document, storage: Arc<dyn DocumentStorage>) -> Self {
        Self {
            state: RwLock::new(State {
                document,
                revision: 0,
                persisted: 0,
            }),
            storage,
            persist_lock: Mutex::new(()),
        }
    }

    /// Load the initial document from storage. A missing document starts empty.
    pub async fn load(storage: Arc<dyn DocumentStorage>) -> DocumentStoreResult<Self> {
        let document = match storage.read().await {
            Ok(document) => document,
            Err(err) if err.is_not_found() => {
                info!(location = %storage.describe(), "No persisted document, starting empty");
                Document::default()
            }
            Err(err) => return Err(err),
        };
        Ok(Self::new(document, storage))
    }

    pub fn storage(&self) -> &Arc<dyn DocumentStorage> {
        &self.storage
    }

    /// Clone of the current document
    pub async fn snapshot(&self) -> Document {
        self.state.read().await.document.clone()
    }

    pub async fn revision(&self) -> Revision {
        self.state.read().await.revision
    }

    /// Latest revision known to be in storage
    pub async fn persisted_revision(&self) -> Revision {
        self.state.read().await.persisted
    }

    /// Run `f` against the current document
    pub async fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.state.read().await.document)
    }

    /// Mutate the document in place and bump the revision
    pub async fn update<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut state = self.state.write().await;
        let result = f(&mut state.document);
        state.revision += 1;
        result
    }

    /// Replace the document with one read from storage, unconditionally
    pub async fn replace(&self, document: Document) -> Revision {
        let mut state = self.state.write().await;
        state.document = document;
        state.revision += 1;
        state.persisted = state.revision;
        state.revision
    }

    /// Replace the document with one read from storage, but only if nothing
    /// changed since `expected` and every change up to it was persisted.
    ///
    /// Returns the new revision, or the current one on conflict.
    pub async fn replace_if(&self, expected: Revision, document: Document) -> Result<Revision, Revision> {
        let mut state = self.state.write().await;
        if state.revision != expected || state.persisted != state.revision {
            debug!(
                expected,
                current = state.revision,
                persisted = state.persisted,
                "Document replacement conflict"
            );
            return Err(state.revision);
        }

        state.document = document;
        state.revision += 1;
        state.persisted = state.revision;
        Ok(state.revision)
    }

    /// Write the current document to storage (the persist signal)
    pub async fn persist(&self) -> DocumentStoreResult<Revision> {
        let _guard = self.persist_lock.lock().await;

        let (document, revision) = {
            let state = self.state.read().await;
            (state.document.clone(), state.revision)
        };

        self.storage.write(&document).await?;

        let mut state = self.state.write().await;
        state.persisted = state.persisted.max(revision);
        debug!(revision, location = %self.storage.describe(), "Persisted document");
        Ok(revision)
    }

    /// Read the persisted document without touching the in-memory one
    pub async fn read_persisted(&self) -> DocumentStoreResult<Document> {
        self.storage.read().await
    }
}
