//! Data connection command routing
//!
//! Handles: connect_spotify, connect_youtube

use crate::models::{SessionContext, SpotifySummary, YouTubeSummary};
use serde_json::Value;

use super::{get_arg, route_async, ServerAppState};

pub async fn connect_spotify(
    state: &ServerAppState,
    user_id: &str,
    code: &str,
) -> Result<SpotifySummary, String> {
    state
        .connections
        .connect_spotify(&SessionContext::for_user(user_id), code)
        .await
        .map_err(|e| format!("Failed to connect Spotify: {}", e))
}

pub async fn connect_youtube(
    state: &ServerAppState,
    user_id: &str,
    code: &str,
) -> Result<YouTubeSummary, String> {
    state
        .connections
        .connect_youtube(&SessionContext::for_user(user_id), code)
        .await
        .map_err(|e| format!("Failed to connect YouTube: {}", e))
}

/// Route connection commands
pub async fn route_connection_command(
    cmd: &str,
    args: Value,
    state: &ServerAppState,
) -> Result<Value, String> {
    match cmd {
        "connect_spotify" => {
            let user_id: String = get_arg(&args, "userId")?;
            let code: String = get_arg(&args, "code")?;
            route_async!(connect_spotify(state, &user_id, &code))
        }

        "connect_youtube" => {
            let user_id: String = get_arg(&args, "userId")?;
            let code: String = get_arg(&args, "code")?;
            route_async!(connect_youtube(state, &user_id, &code))
        }

        _ => Err(format!("Unknown connection command: {}", cmd)),
    }
}

/// Check if a command is a connection command
pub fn is_connection_command(cmd: &str) -> bool {
    matches!(cmd, "connect_spotify" | "connect_youtube")
}
