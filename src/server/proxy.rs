//! `POST /api/invoke`: one endpoint carrying `{cmd, args}` for every onboarding command
//!
//! Replies always use the `{success, data?, error?}` envelope, whatever the status.

use super::routes;
use super::ServerAppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    /// Command name, e.g. "start_onboarding"
    pub cmd: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvokeResponse {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// A failed command with the status it maps to
pub struct InvokeError {
    status: StatusCode,
    message: String,
}

impl InvokeError {
    fn shutting_down() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Server is shutting down".to_string(),
        }
    }

    /// Route errors are plain strings; lookups that miss become 404
    fn from_command(message: String) -> Self {
        let status = if message.starts_with("Session not found")
            || message.starts_with("No profile found")
        {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_REQUEST
        };
        Self { status, message }
    }
}

impl IntoResponse for InvokeError {
    fn into_response(self) -> Response {
        (self.status, Json(InvokeResponse::failed(self.message))).into_response()
    }
}

pub async fn invoke_handler(
    State(state): State<ServerAppState>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, InvokeError> {
    // Args carry user text; only the command name is logged
    log::debug!("Invoke command: {}", req.cmd);

    if state.shutdown_state.is_shutdown_requested() {
        return Err(InvokeError::shutting_down());
    }

    routes::route_command(&req.cmd, req.args, &state)
        .await
        .map(|data| Json(InvokeResponse::ok(data)))
        .map_err(|e| {
            log::warn!("Command {} failed: {}", req.cmd, e);
            InvokeError::from_command(e)
        })
}
