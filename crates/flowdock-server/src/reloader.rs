//! Document reloader
//!
//! Re-reads the persisted document, swaps it in for the in-memory copy and
//! re-initializes every flow in the engine, one at a time.

use flowdock_core::{Document, FlowDefinition, FlowRuntimeSettings};
use flowdock_document_store::SharedDocument;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::FlowEngine;

/// Result of one reload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The document was replaced and every flow was handed to the engine
    Reloaded {
        /// Flows the engine accepted
        loaded: Vec<String>,
        /// Flows the engine rejected or that could not be read
        failed: Vec<String>,
    },
    /// Nothing was replaced; the in-memory document is unchanged
    Aborted(String),
}

impl ReloadOutcome {
    pub fn is_reloaded(&self) -> bool {
        matches!(self, ReloadOutcome::Reloaded { .. })
    }
}

/// Flow counts of the most recent completed reload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadStats {
    pub loaded: usize,
    pub failed: usize,
}

/// Reloads the shared document from storage into the engine
pub struct DocumentReloader {
    document: Arc<SharedDocument>,
    engine: Arc<dyn FlowEngine>,
    settings: FlowRuntimeSettings,
    max_conflict_retries: u32,
    reload_lock: Mutex<()>,
    last_reload: RwLock<Option<ReloadStats>>,
}

impl std::fmt::Debug for DocumentReloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentReloader")
            .field("settings", &self.settings)
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish()
    }
}

impl DocumentReloader {
    pub fn new(
        document: Arc<SharedDocument>,
        engine: Arc<dyn FlowEngine>,
        settings: FlowRuntimeSettings,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            document,
            engine,
            settings,
            max_conflict_retries,
            reload_lock: Mutex::new(()),
            last_reload: RwLock::new(None),
        }
    }

    /// Counts from the last reload that replaced the document, if any
    pub async fn last_reload(&self) -> Option<ReloadStats> {
        *self.last_reload.read().await
    }

    /// Replace the in-memory document with the persisted one and reload
    /// every flow.
    ///
    /// A read failure, or a document that keeps changing underneath the
    /// reload, aborts before anything is replaced. Once replaced, a flow that
    /// fails to load is logged and the sweep moves on.
    pub async fn reload(&self) -> ReloadOutcome {
        let _guard = self.reload_lock.lock().await;

        if let Err(reason) = self.replace_from_storage().await {
            warn!(%reason, "Reload aborted, keeping in-memory document");
            return ReloadOutcome::Aborted(reason);
        }

        let flow_ids = self.document.read(|doc| doc.flow_ids()).await;
        let mut loaded = Vec::with_capacity(flow_ids.len());
        let mut failed = Vec::new();

        for flow_id in flow_ids {
            let Some(flow) = self.prepare_flow(&flow_id).await else {
                failed.push(flow_id);
                continue;
            };

            match self.engine.load(&flow_id, &flow).await {
                Ok(()) => {
                    debug!(%flow_id, "Flow reloaded");
                    loaded.push(flow_id);
                }
                Err(err) => {
                    error!(%flow_id, error = %err, "Failed to reload flow");
                    failed.push(flow_id);
                }
            }
        }

        info!(loaded = loaded.len(), failed = failed.len(), "Document reloaded");
        *self.last_reload.write().await = Some(ReloadStats {
            loaded: loaded.len(),
            failed: failed.len(),
        });
        ReloadOutcome::Reloaded { loaded, failed }
    }

    async fn replace_from_storage(&self) -> Result<(), String> {
        let mut attempt = 0;
        loop {
            let expected = self.document.revision().await;

            let persisted = self
                .document
                .read_persisted()
                .await
                .map_err(|err| format!("failed to read persisted document: {}", err))?;

            match self.document.replace_if(expected, persisted).await {
                Ok(revision) => {
                    debug!(revision, attempt, "Document replaced from storage");
                    return Ok(());
                }
                Err(current) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    debug!(expected, current, attempt, "Document changed during reload, retrying");
                    tokio::task::yield_now().await;
                }
                Err(current) => {
                    return Err(format!(
                        "document changed during reload (revision {}) after {} retries",
                        current, attempt
                    ));
                }
            }
        }
    }

    /// Apply the runtime settings to one flow, write it back and return it
    async fn prepare_flow(&self, flow_id: &str) -> Option<FlowDefinition> {
        let settings = &self.settings;
        let prepared = self
            .document
            .update(|doc: &mut Document| -> Option<Result<FlowDefinition, String>> {
                let mut flow = doc.flow(flow_id)?.map_err(|err| err.to_string());
                if let Ok(flow) = flow.as_mut() {
                    flow.apply_runtime_settings(settings, doc.variables.as_ref());
                    if let Err(err) = doc.set_flow(flow_id, flow) {
                        return Some(Err(err.to_string()));
                    }
                }
                Some(flow)
            })
            .await;

        match prepared {
            Some(Ok(flow)) => Some(flow),
            Some(Err(reason)) => {
                warn!(%flow_id, %reason, "Flow definition is malformed, skipping");
                None
            }
            None => {
                warn!(%flow_id, "Flow disappeared during reload");
                None
            }
        }
    }
}
