//! Command routing modules
//!
//! Commands are grouped by domain:
//! - onboarding_routes: onboarding sessions, turns, coverage and forced finish
//! - profile_routes: stored profile lookup and mirror-chat corrections
//! - connection_routes: Spotify and YouTube data connections

pub mod connection_routes;
pub mod onboarding_routes;
pub mod profile_routes;

use serde_json::Value;

use super::ServerAppState;
use crate::models::SessionContext;

// =============================================================================
// Argument helpers
// =============================================================================

/// Extract a required argument from JSON args
pub fn get_arg<T: serde::de::DeserializeOwned>(args: &Value, name: &str) -> Result<T, String> {
    serde_json::from_value(
        args.get(name)
            .ok_or_else(|| format!("Missing argument: {}", name))?
            .clone(),
    )
    .map_err(|e| format!("Invalid argument {}: {}", name, e))
}

/// Extract an optional argument from JSON args
pub fn get_opt_arg<T: serde::de::DeserializeOwned>(
    args: &Value,
    name: &str,
) -> Result<Option<T>, String> {
    match args.get(name) {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| format!("Invalid argument {}: {}", name, e)),
        _ => Ok(None),
    }
}

/// Caller identity from the optional `userId` argument
pub fn session_context(args: &Value) -> Result<SessionContext, String> {
    let user_id: Option<String> = get_opt_arg(args, "userId")?;
    Ok(SessionContext { user_id })
}

// =============================================================================
// Command Routing Macros
// =============================================================================

/// Routes an async command: awaits the handler and serializes its result
#[macro_export]
macro_rules! route_async {
    ($handler:expr) => {{
        let result = $handler.await?;
        serde_json::to_value(result).map_err(|e| e.to_string())
    }};
}

pub use route_async;

// =============================================================================
// Main Command Dispatcher
// =============================================================================

/// Route a command to its implementation by dispatching to the appropriate sub-router
pub async fn route_command(
    cmd: &str,
    args: Value,
    state: &ServerAppState,
) -> Result<Value, String> {
    if onboarding_routes::is_onboarding_command(cmd) {
        return onboarding_routes::route_onboarding_command(cmd, args, state).await;
    }

    if profile_routes::is_profile_command(cmd) {
        return profile_routes::route_profile_command(cmd, args, state).await;
    }

    if connection_routes::is_connection_command(cmd) {
        return connection_routes::route_connection_command(cmd, args, state).await;
    }

    Err(format!("Unknown command: {}", cmd))
}
