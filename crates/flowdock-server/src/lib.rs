//!
//! Flowdock Server - registers components into a running flow engine
//!
//! This module exports all the components of the Flowdock Server.

// External dependencies
use std::sync::Arc;

use flowdock_document_store::{DocumentStorage, FileDocumentStorage, MemoryDocumentStorage, SharedDocument};

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Flow engine contract
pub mod engine;

/// Error module
pub mod error;

/// Registry store module
pub mod registry;

/// Document reloader module
pub mod reloader;

/// Server module
pub mod server;

/// Registration pipeline module
pub mod service;

/// Flow synchronizer module
pub mod synchronizer;

// Re-export key types
pub use config::ServerConfig;
pub use engine::{EngineError, FlowEngine, LocalFlowEngine};
pub use error::{ServerError, ServerResult};
pub use registry::RegistryStore;
pub use reloader::{DocumentReloader, ReloadOutcome, ReloadStats};
pub use server::FlowdockServer;
pub use service::ComponentService;
pub use synchronizer::FlowSynchronizer;

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    // Initialize logging
    init_logging(&config);

    // Create dependencies
    let storage = create_document_storage(&config)?;
    let document = Arc::new(SharedDocument::load(storage).await?);
    let engine: Arc<dyn FlowEngine> = Arc::new(LocalFlowEngine::new());

    // Create and run server
    let server = FlowdockServer::new(config, document, engine);
    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // Create filter based on config
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Initialize subscriber
    fmt().with_env_filter(filter).with_target(true).init();
}

/// Create the document storage selected by `document_store_url`
pub fn create_document_storage(config: &ServerConfig) -> ServerResult<Arc<dyn DocumentStorage>> {
    let url = config.document_store_url.as_str();

    if url.starts_with("memory://") {
        // Use in-memory storage for development and testing
        tracing::info!("Using in-memory document store");
        Ok(Arc::new(MemoryDocumentStorage::new()))
    } else if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            return Err(ServerError::ConfigError("Missing path in document store URL".to_string()));
        }
        tracing::info!("Using file document store at {}", path);
        Ok(Arc::new(FileDocumentStorage::new(path)))
    } else {
        Err(ServerError::ConfigError(format!("Unsupported document store URL: {}", url)))
    }
}
