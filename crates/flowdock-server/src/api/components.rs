//! Component registration endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flowdock_core::ComponentDefinition;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::errors::api_error_response;
use crate::error::ServerError;
use crate::server::FlowdockServer;

/// `POST /api/flow/register`
pub async fn register_component_handler(
    State(server): State<Arc<FlowdockServer>>,
    payload: Result<Json<ComponentDefinition>, JsonRejection>,
) -> Response {
    let Json(definition) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected registration body");
            let err = ServerError::BadRequest(rejection.body_text());
            return api_error_response(&err, "Failed to register component");
        }
    };

    info!(name = ?definition.name, "Component registration requested");

    match server.service().register(definition).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => api_error_response(&err, "Failed to register component"),
    }
}

/// `GET /api/flow/components`
pub async fn list_components_handler(State(server): State<Arc<FlowdockServer>>) -> Response {
    (StatusCode::OK, Json(server.service().list().await)).into_response()
}

/// `POST /api/flow/refresh-components`
pub async fn refresh_components_handler(State(server): State<Arc<FlowdockServer>>) -> Response {
    match server.service().refresh().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => api_error_response(&err, "Failed to refresh components"),
    }
}
