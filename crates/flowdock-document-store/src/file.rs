//! File-backed implementation of DocumentStorage
//!
//! The document is a single UTF-8 JSON file. Writes go to a sibling
//! temporary file first and are renamed into place, and are serialized so
//! two persist signals never interleave their bytes.

use async_trait::async_trait;
use flowdock_core::Document;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{DocumentStorage, DocumentStoreError, DocumentStoreResult};

/// File-backed implementation of DocumentStorage
#[derive(Debug)]
pub struct FileDocumentStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDocumentStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "database.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStorage for FileDocumentStorage {
    async fn read(&self) -> DocumentStoreResult<Document> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(DocumentStoreError::NotFound(self.describe()));
            }
            Err(err) => return Err(err.into()),
        };

        let document = Document::from_slice(&data)?;
        debug!(path = %self.path.display(), bytes = data.len(), "Read document");
        Ok(document)
    }

    async fn write(&self, document: &Document) -> DocumentStoreResult<()> {
        let data = serde_json::to_vec_pretty(document)?;

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &data).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = data.len(), "Wrote document");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStorage::new(dir.path().join("database.json"));
        assert!(store.read().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_write_creates_parent_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStorage::new(dir.path().join("flowstream").join("database.json"));

        let mut doc = Document::default();
        doc.variables = Some(json!({ "key": "value" }));
        doc.components_mut().insert("double".to_string(), json!("body"));
        doc.flows.insert("f1".to_string(), json!({ "components": {} }));

        store.write(&doc).await.unwrap();
        assert_eq!(store.read().await.unwrap(), doc);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_empty_file_reads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        std::fs::write(&path, "").unwrap();

        let store = FileDocumentStorage::new(&path);
        assert_eq!(store.read().await.unwrap(), Document::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        std::fs::write(&path, "{\"f1\": ").unwrap();

        let store = FileDocumentStorage::new(&path);
        assert!(matches!(store.read().await, Err(DocumentStoreError::Serialization(_))));
    }
}
