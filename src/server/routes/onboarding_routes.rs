//! Onboarding command routing
//!
//! Handles: start_onboarding, send_onboarding_message, switch_prompt_mode,
//! get_onboarding_session, evaluate_coverage, finish_onboarding

use crate::models::{
    CoverageReport, InputChannel, Message, OnboardingSession, OnboardingState, Profile,
    PromptMode, SessionContext,
};
use crate::onboarding::sessions::SharedSession;
use crate::onboarding::{new_conversation, new_session, TurnOutcome};
use serde::Serialize;
use serde_json::Value;

use super::{get_arg, get_opt_arg, route_async, session_context, ServerAppState};

/// What the client needs to render a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub mode: PromptMode,
    pub channel: InputChannel,
    pub state: OnboardingState,
    pub messages: Vec<Message>,
    pub answer_count: usize,
    pub max_turns: usize,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// Result of a message or finish request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub outcome: TurnOutcome,
    pub session: SessionView,
}

fn view(state: &ServerAppState, session: &OnboardingSession) -> SessionView {
    SessionView {
        session_id: session.id.clone(),
        mode: session.mode,
        channel: session.channel,
        state: session.state.clone(),
        messages: session.conversation.messages.clone(),
        answer_count: session.conversation.answer_count(),
        max_turns: state.orchestrator.policy().max_turns(),
        progress: state.orchestrator.progress(&session.conversation),
        profile: session.profile.clone(),
    }
}

/// Settle a session a dropped request left mid-synthesis
fn recover(state: &ServerAppState, session: &mut OnboardingSession) -> bool {
    match state.orchestrator.recover_interrupted(session) {
        Ok(changed) => changed,
        Err(e) => {
            log::warn!("Could not recover session {}: {}", session.id, e);
            false
        }
    }
}

async fn lookup(state: &ServerAppState, session_id: &str) -> Result<SharedSession, String> {
    state
        .sessions
        .get(session_id)
        .await
        .map_err(|e| format!("Failed to load session: {}", e))?
        .ok_or_else(|| format!("Session not found: {}", session_id))
}

pub async fn start_onboarding(
    state: &ServerAppState,
    mode: Option<PromptMode>,
    channel: Option<InputChannel>,
) -> Result<SessionView, String> {
    let mode = mode.unwrap_or(state.config.onboarding.default_mode);
    let session = new_session(mode, channel.unwrap_or_default());
    log::info!("Started onboarding session {} ({})", session.id, mode);

    let shared = state.sessions.insert(session).await;
    let session = shared.lock().await;
    Ok(view(state, &session))
}

pub async fn send_onboarding_message(
    state: &ServerAppState,
    session_id: &str,
    content: &str,
    ctx: &SessionContext,
) -> Result<TurnResponse, String> {
    let shared = lookup(state, session_id).await?;
    // Held for the whole turn: one message at a time per session
    let mut session = shared.lock().await;

    let outcome = state
        .orchestrator
        .handle_user_message(&mut session, content, ctx)
        .await
        .map_err(|e| format!("Failed to send message: {}", e))?;
    Ok(settle(state, &session, outcome).await)
}

/// Save the draft after a turn, or drop the session once its profile is stored
async fn settle(
    state: &ServerAppState,
    session: &OnboardingSession,
    outcome: TurnOutcome,
) -> TurnResponse {
    if !state.sessions.retire(session).await {
        state.sessions.save_draft(session);
    }
    TurnResponse {
        outcome,
        session: view(state, session),
    }
}

pub async fn switch_prompt_mode(
    state: &ServerAppState,
    session_id: &str,
    mode: PromptMode,
) -> Result<SessionView, String> {
    let shared = lookup(state, session_id).await?;
    let mut session = shared.lock().await;
    recover(state, &mut session);

    if !session.state.can_restart() {
        return Err(format!(
            "Failed to switch mode: onboarding already finished ({})",
            session.state.name()
        ));
    }

    // A failed session starts over even in the same mode
    if session.mode != mode || !session.state.accepts_input() {
        log::info!("Session {} switching mode {} -> {}", session.id, session.mode, mode);
        session.switch_mode(mode, new_conversation(mode));
        state.sessions.save_draft(&session);
    }
    Ok(view(state, &session))
}

pub async fn get_onboarding_session(
    state: &ServerAppState,
    session_id: &str,
) -> Result<SessionView, String> {
    let shared = lookup(state, session_id).await?;
    let mut session = shared.lock().await;
    if recover(state, &mut session) {
        state.sessions.save_draft(&session);
    }
    Ok(view(state, &session))
}

pub async fn evaluate_coverage(
    state: &ServerAppState,
    session_id: &str,
) -> Result<CoverageReport, String> {
    let shared = lookup(state, session_id).await?;
    let snapshot = shared.lock().await.clone();
    Ok(state.orchestrator.coverage(&snapshot).await)
}

pub async fn finish_onboarding(
    state: &ServerAppState,
    session_id: &str,
    ctx: &SessionContext,
) -> Result<TurnResponse, String> {
    let shared = lookup(state, session_id).await?;
    let mut session = shared.lock().await;

    let outcome = state
        .orchestrator
        .finish_now(&mut session, ctx)
        .await
        .map_err(|e| format!("Failed to finish onboarding: {}", e))?;
    Ok(settle(state, &session, outcome).await)
}

/// Route onboarding commands
pub async fn route_onboarding_command(
    cmd: &str,
    args: Value,
    state: &ServerAppState,
) -> Result<Value, String> {
    match cmd {
        "start_onboarding" => {
            let mode: Option<PromptMode> = get_opt_arg(&args, "mode")?;
            let channel: Option<InputChannel> = get_opt_arg(&args, "channel")?;
            route_async!(start_onboarding(state, mode, channel))
        }

        "send_onboarding_message" => {
            let session_id: String = get_arg(&args, "sessionId")?;
            let content: String = get_arg(&args, "content")?;
            let ctx = session_context(&args)?;
            route_async!(send_onboarding_message(state, &session_id, &content, &ctx))
        }

        "switch_prompt_mode" => {
            let session_id: String = get_arg(&args, "sessionId")?;
            let mode: PromptMode = get_arg(&args, "mode")?;
            route_async!(switch_prompt_mode(state, &session_id, mode))
        }

        "get_onboarding_session" => {
            let session_id: String = get_arg(&args, "sessionId")?;
            route_async!(get_onboarding_session(state, &session_id))
        }

        "evaluate_coverage" => {
            let session_id: String = get_arg(&args, "sessionId")?;
            route_async!(evaluate_coverage(state, &session_id))
        }

        "finish_onboarding" => {
            let session_id: String = get_arg(&args, "sessionId")?;
            let ctx = session_context(&args)?;
            route_async!(finish_onboarding(state, &session_id, &ctx))
        }

        _ => Err(format!("Unknown onboarding command: {}", cmd)),
    }
}

/// Check if a command is an onboarding command
pub fn is_onboarding_command(cmd: &str) -> bool {
    matches!(
        cmd,
        "start_onboarding"
            | "send_onboarding_message"
            | "switch_prompt_mode"
            | "get_onboarding_session"
            | "evaluate_coverage"
            | "finish_onboarding"
    )
}
