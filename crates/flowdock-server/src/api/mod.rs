//! API module for the Flowdock Server
//!
//! This module contains the API routes and handlers for the Flowdock Server.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub mod components;
pub mod errors;
pub mod health;

use crate::server::FlowdockServer;

/// Build the router for API endpoints.
///
/// The request timeout only covers the read-only routes. Registration and
/// refresh run on their own tasks and answer once the pipeline is done.
pub fn build_router(server: Arc<FlowdockServer>) -> Router {
    let body_limit = server.config.max_register_body_bytes;
    let timeout = Duration::from_secs(server.config.request_timeout_secs);

    // Component registration
    let pipeline_routes = Router::new()
        .route("/api/flow/register", post(components::register_component_handler))
        .route("/api/flow/refresh-components", post(components::refresh_components_handler))
        .layer(DefaultBodyLimit::max(body_limit));

    let read_routes = Router::new()
        .route("/api/flow/components", get(components::list_components_handler))
        // Health check
        .route("/health", get(health::health_check))
        .layer(TimeoutLayer::new(timeout));

    Router::new()
        .merge(pipeline_routes)
        .merge(read_routes)
        .layer(TraceLayer::new_for_http())
        // Shared state
        .with_state(server)
}

pub use errors::api_error_response;
