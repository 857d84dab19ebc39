//! Main Flowdock Server implementation
//!
//! This module contains the FlowdockServer implementation.

use flowdock_document_store::{Revision, SharedDocument};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::engine::FlowEngine;
use crate::error::ServerResult;
use crate::registry::RegistryStore;
use crate::reloader::{DocumentReloader, ReloadStats};
use crate::service::ComponentService;
use crate::synchronizer::FlowSynchronizer;

/// Snapshot of the document state for health reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub location: String,
    pub revision: Revision,
    pub persisted_revision: Revision,
    pub flows: usize,
    pub components: usize,
    /// Counts from the last completed reload; `None` before the first one
    pub last_reload: Option<ReloadStats>,
}

/// Main server implementation
#[derive(Clone)]
pub struct FlowdockServer {
    /// Configuration
    pub config: ServerConfig,

    /// Shared flow document
    document: Arc<SharedDocument>,

    /// Registration pipeline
    service: Arc<ComponentService>,
}

impl std::fmt::Debug for FlowdockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowdockServer")
            .field("config", &self.config)
            .field("document", &self.document.storage().describe())
            .finish()
    }
}

impl FlowdockServer {
    /// Create a new FlowdockServer around an already loaded document
    pub fn new(config: ServerConfig, document: Arc<SharedDocument>, engine: Arc<dyn FlowEngine>) -> Self {
        let registry = Arc::new(RegistryStore::new(document.clone()));
        let synchronizer = Arc::new(FlowSynchronizer::new(document.clone(), registry.clone()));
        let reloader = Arc::new(DocumentReloader::new(
            document.clone(),
            engine,
            config.flow_runtime.clone(),
            config.reload_conflict_retries,
        ));
        let service = Arc::new(ComponentService::new(
            document.clone(),
            registry,
            synchronizer,
            reloader,
            config.serialize_registrations,
        ));

        Self {
            config,
            document,
            service,
        }
    }

    pub fn service(&self) -> &Arc<ComponentService> {
        &self.service
    }

    pub fn document(&self) -> &Arc<SharedDocument> {
        &self.document
    }

    /// Run the startup catch-up propagation after the configured delay
    pub fn spawn_startup_sync(&self) -> JoinHandle<()> {
        let service = self.service.clone();
        let delay = Duration::from_millis(self.config.startup_sync_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.startup_sync().await;
        })
    }

    /// Run the server
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting Flowdock Server");

        // Build the API router
        let app = crate::api::build_router(Arc::new(self.clone()));

        // Create and bind the TCP listener
        let listener = TcpListener::bind((self.config.bind_address.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!("Listening on {}", addr);

        self.spawn_startup_sync();

        // Run the server
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Flowdock Server stopped");
        Ok(())
    }

    /// Current document state
    pub async fn health(&self) -> HealthReport {
        let (flows, components) = self
            .document
            .read(|doc| {
                (
                    doc.flow_ids().len(),
                    doc.components.as_ref().map_or(0, |components| components.len()),
                )
            })
            .await;

        HealthReport {
            location: self.document.storage().describe(),
            revision: self.document.revision().await,
            persisted_revision: self.document.persisted_revision().await,
            flows,
            components,
            last_reload: self.service.reloader().last_reload().await,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
