//! Registry store
//!
//! The canonical component registry lives under the document's `components`
//! key. Alongside each body written here the store keeps a structured
//! metadata record, keyed by component id and tied to the body's fingerprint,
//! so listings do not have to parse the body back. Entries the sidecar does
//! not know about (or whose body changed underneath it) fall back to text
//! extraction.

use dashmap::DashMap;
use flowdock_core::{Compilation, ComponentId, ComponentMetadata, ComponentSummary, CompiledComponent};
use flowdock_document_store::SharedDocument;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ServerResult;

#[derive(Debug, Clone)]
struct SidecarEntry {
    fingerprint: String,
    metadata: ComponentMetadata,
}

/// Component registry backed by the shared document
#[derive(Debug)]
pub struct RegistryStore {
    document: Arc<SharedDocument>,
    sidecar: DashMap<String, SidecarEntry>,
}

impl RegistryStore {
    pub fn new(document: Arc<SharedDocument>) -> Self {
        Self {
            document,
            sidecar: DashMap::new(),
        }
    }

    /// Insert or overwrite a component, then emit the persist signal.
    ///
    /// The in-memory write is complete before persisting starts; a persist
    /// failure is returned but does not roll the write back.
    pub async fn put(&self, id: &ComponentId, compilation: &Compilation) -> ServerResult<()> {
        let body = compilation.compiled.as_str().to_string();
        let replaced = self
            .document
            .update(|doc| {
                doc.components_mut()
                    .insert(id.as_str().to_string(), Value::String(body))
                    .is_some()
            })
            .await;

        self.sidecar.insert(
            id.as_str().to_string(),
            SidecarEntry {
                fingerprint: compilation.compiled.fingerprint(),
                metadata: compilation.metadata.clone(),
            },
        );

        info!(component_id = %id, replaced, "Component saved to registry");

        self.document.persist().await?;
        Ok(())
    }

    /// Compiled body stored under `id`, if it is a non-empty string
    pub async fn get(&self, id: &str) -> Option<CompiledComponent> {
        self.document
            .read(|doc| match doc.component(id) {
                Some(Value::String(body)) if !body.is_empty() => Some(CompiledComponent::from_stored(body.clone())),
                _ => None,
            })
            .await
    }

    /// Every non-empty string entry, in registry order
    async fn string_entries(&self) -> Vec<(String, CompiledComponent)> {
        self.document
            .read(|doc| {
                doc.components
                    .iter()
                    .flatten()
                    .filter_map(|(id, value)| match value {
                        Value::String(body) if !body.is_empty() => {
                            Some((id.clone(), CompiledComponent::from_stored(body.clone())))
                        }
                        _ => None,
                    })
                    .collect()
            })
            .await
    }

    fn fresh_sidecar(&self, id: &str, compiled: &CompiledComponent) -> Option<ComponentMetadata> {
        let entry = self.sidecar.get(id)?;
        if entry.fingerprint == compiled.fingerprint() {
            Some(entry.metadata.clone())
        } else {
            debug!(component_id = %id, "Sidecar metadata is stale");
            None
        }
    }

    /// Display records for every well-formed entry.
    ///
    /// Non-string entries and bodies without an extractable id and name are
    /// left out silently.
    pub async fn list(&self) -> Vec<ComponentSummary> {
        self.string_entries()
            .await
            .into_iter()
            .filter_map(|(id, compiled)| match self.fresh_sidecar(&id, &compiled) {
                Some(metadata) => Some(metadata.summary()),
                None => compiled.summary(),
            })
            .collect()
    }

    /// Entries whose body declares the API author marker
    pub async fn api_components(&self) -> Vec<(String, CompiledComponent)> {
        self.string_entries()
            .await
            .into_iter()
            .filter(|(_, compiled)| compiled.is_api_origin())
            .collect()
    }
}
