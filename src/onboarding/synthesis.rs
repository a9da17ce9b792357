// Profile synthesis: finished transcript -> complete Profile

use crate::llm::{CallKind, CallTimeouts, ChatCompletion, LlmError, LlmResult};
use crate::models::{Conversation, ConversationTurn, Profile};
use crate::parsers::find_json_object;
use crate::templates::builtin::PROFILE_SYNTHESIS;
use crate::templates::render_builtin;
use crate::utils::preview;
use serde_json::json;

/// Build the synthesis prompt: field instructions followed by the transcript
pub fn build_prompt(conversation: &Conversation) -> LlmResult<String> {
    render_builtin(
        PROFILE_SYNTHESIS,
        &json!({ "transcript": conversation.render_transcript() }),
    )
    .map_err(LlmError::Prompt)
}

/// Parse a synthesis reply into a fully defaulted profile.
///
/// The first JSON object in the reply is used; commentary around it is ignored.
pub fn parse_profile(raw: &str) -> Option<Profile> {
    find_json_object(raw).map(|value| Profile::from_llm_value(&value))
}

/// Synthesize a profile from the transcript.
///
/// Call failures and replies without a JSON object are errors, so callers can
/// decide between resuming the conversation and falling back.
pub async fn synthesize(
    llm: &dyn ChatCompletion,
    conversation: &Conversation,
    timeouts: &CallTimeouts,
) -> LlmResult<Profile> {
    let prompt = build_prompt(conversation)?;
    let turns = [ConversationTurn::user(prompt)];

    let raw = llm
        .complete(&turns, &timeouts.options(CallKind::Synthesis))
        .await?;

    let profile = parse_profile(&raw).ok_or_else(|| {
        LlmError::InvalidResponse(format!("no JSON object in reply: {}", preview(&raw, 200)))
    })?;

    log::info!(
        "Synthesized profile from {} answers ({} extra keys)",
        conversation.answer_count(),
        profile.extra.len()
    );
    Ok(profile)
}

/// Synthesize, handing out the minimal fallback profile on any failure
pub async fn synthesize_or_fallback(
    llm: &dyn ChatCompletion,
    conversation: &Conversation,
    timeouts: &CallTimeouts,
) -> Profile {
    match synthesize(llm, conversation, timeouts).await {
        Ok(profile) => profile,
        Err(e) => {
            log::warn!("Profile synthesis failed, using fallback profile: {}", e);
            Profile::fallback()
        }
    }
}
