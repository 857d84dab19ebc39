//! Health check endpoint for the Flowdock Server

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::FlowdockServer;

/// Health check handler
///
/// Reports the state of the in-memory document: its revision, how far
/// persistence has caught up, and how many flows and components it holds.
/// The engine block carries the flow counts of the last reload, or nulls
/// when nothing has been reloaded yet.
pub async fn health_check(State(server): State<Arc<FlowdockServer>>) -> impl IntoResponse {
    debug!("Health check requested");

    let report = server.health().await;
    let status = if report.persisted_revision == report.revision {
        "UP"
    } else {
        "DEGRADED"
    };

    let response = json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "document": {
            "location": report.location,
            "revision": report.revision,
            "persistedRevision": report.persisted_revision,
            "flows": report.flows,
            "components": report.components,
        },
        "engine": {
            "loadedFlows": report.last_reload.map(|stats| stats.loaded),
            "failedFlows": report.last_reload.map(|stats| stats.failed),
        },
    });

    (StatusCode::OK, Json(response))
}
