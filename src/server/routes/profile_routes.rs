//! Profile command routing
//!
//! Handles: get_profile, has_profile, mirror_profile

use crate::events::{emit_event, EVENT_PROFILE_UPDATED};
use crate::models::{Profile, SessionContext};
use crate::onboarding::{apply_statement, SyncOutcome};
use crate::utils::ResultExt;
use serde::Serialize;
use serde_json::Value;

use super::{get_arg, route_async, ServerAppState};

/// Result of a mirror-chat correction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorResponse {
    pub profile: Profile,
    pub changed_fields: Vec<String>,
    /// Absent when nothing changed and nothing was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdatedPayload<'a> {
    user_id: &'a str,
    changed_fields: &'a [String],
}

pub async fn get_profile(state: &ServerAppState, user_id: &str) -> Result<Option<Profile>, String> {
    let record = state
        .store()
        .get(user_id)
        .await
        .with_context("Failed to load profile")?;
    Ok(record.and_then(|r| r.profile()))
}

/// Whether the user already finished onboarding, for new-user routing
pub async fn has_profile(state: &ServerAppState, user_id: &str) -> Result<bool, String> {
    state
        .store()
        .has_profile(user_id)
        .await
        .with_context("Failed to check profile")
}

pub async fn mirror_profile(
    state: &ServerAppState,
    user_id: &str,
    statement: &str,
) -> Result<MirrorResponse, String> {
    let profile = get_profile(state, user_id)
        .await?
        .ok_or_else(|| format!("No profile found for user {}", user_id))?;

    let update = apply_statement(
        state.orchestrator.llm().as_ref(),
        &profile,
        statement,
        state.orchestrator.timeouts(),
    )
    .await
    .map_err(|e| format!("Failed to update profile: {}", e))?;

    if update.changed_fields.is_empty() {
        return Ok(MirrorResponse {
            profile: update.profile,
            changed_fields: Vec::new(),
            sync: None,
        });
    }

    let ctx = SessionContext::for_user(user_id);
    let outcome = state
        .orchestrator
        .persistence()
        .update_profile(&ctx, &update.profile)
        .await;
    if outcome.is_persisted() {
        emit_event(
            state.broadcaster.as_ref(),
            EVENT_PROFILE_UPDATED,
            &ProfileUpdatedPayload {
                user_id,
                changed_fields: &update.changed_fields,
            },
        );
    }

    Ok(MirrorResponse {
        profile: update.profile,
        changed_fields: update.changed_fields,
        sync: Some(outcome),
    })
}

/// Route profile commands
pub async fn route_profile_command(
    cmd: &str,
    args: Value,
    state: &ServerAppState,
) -> Result<Value, String> {
    match cmd {
        "get_profile" => {
            let user_id: String = get_arg(&args, "userId")?;
            route_async!(get_profile(state, &user_id))
        }

        "has_profile" => {
            let user_id: String = get_arg(&args, "userId")?;
            route_async!(has_profile(state, &user_id))
        }

        "mirror_profile" => {
            let user_id: String = get_arg(&args, "userId")?;
            let statement: String = get_arg(&args, "statement")?;
            route_async!(mirror_profile(state, &user_id, &statement))
        }

        _ => Err(format!("Unknown profile command: {}", cmd)),
    }
}

/// Check if a command is a profile command
pub fn is_profile_command(cmd: &str) -> bool {
    matches!(cmd, "get_profile" | "has_profile" | "mirror_profile")
}
