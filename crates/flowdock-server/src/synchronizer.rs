//! Flow synchronizer
//!
//! Copies registry entries into each flow's local component map. A flow that
//! already holds an entry under the same id keeps it, so the operation is
//! idempotent and never overwrites a flow's own copy.

use flowdock_core::{CompiledComponent, Propagation};
use flowdock_document_store::SharedDocument;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ServerResult;
use crate::registry::RegistryStore;

/// Propagates components from the registry into flows
#[derive(Debug)]
pub struct FlowSynchronizer {
    document: Arc<SharedDocument>,
    registry: Arc<RegistryStore>,
}

impl FlowSynchronizer {
    pub fn new(document: Arc<SharedDocument>, registry: Arc<RegistryStore>) -> Self {
        Self { document, registry }
    }

    /// Copy one component into every flow that lacks it, then persist
    pub async fn propagate(&self, id: &str, compiled: &CompiledComponent) -> ServerResult<Propagation> {
        let propagation = self
            .document
            .update(|doc| doc.propagate_component(id, compiled.as_str()))
            .await;

        info!(
            component_id = %id,
            added = propagation.added.len(),
            skipped = propagation.skipped.len(),
            invalid = propagation.invalid.len(),
            "Component propagated to flows"
        );

        self.document.persist().await?;
        Ok(propagation)
    }

    /// Copy every API-origin registry entry into every flow that lacks it.
    ///
    /// Returns the number of (flow, component) insertions made. The document
    /// is persisted once, at the end, and only if anything was inserted.
    pub async fn propagate_all_api_components(&self) -> ServerResult<usize> {
        let components = self.registry.api_components().await;
        if components.is_empty() {
            debug!("No API components to propagate");
            return Ok(0);
        }

        let added = self
            .document
            .update(|doc| {
                components
                    .iter()
                    .map(|(id, compiled)| {
                        let propagation = doc.propagate_component(id, compiled.as_str());
                        if !propagation.invalid.is_empty() {
                            warn!(component_id = %id, flows = ?propagation.invalid, "Some flows could not receive component");
                        }
                        propagation.added.len()
                    })
                    .sum::<usize>()
            })
            .await;

        if added > 0 {
            self.document.persist().await?;
        }

        info!(components = components.len(), added, "API components synchronized with all flows");
        Ok(added)
    }
}
