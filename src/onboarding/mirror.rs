// Mirror chat: free-text corrections turned into partial profile updates

use crate::llm::{CallKind, CallTimeouts, ChatCompletion, LlmError, LlmResult};
use crate::models::{ConversationTurn, Profile};
use crate::parsers::find_json_object;
use crate::templates::builtin::MIRROR_PATCH;
use crate::templates::render_builtin;
use crate::utils::preview;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorUpdate {
    pub profile: Profile,
    /// Wire names of the fields that were overwritten
    pub changed_fields: Vec<String>,
}

/// Ask the model which fields `statement` addresses and apply them.
///
/// Only fields present in the model's patch (and of the right type) change;
/// everything else is kept. A blank statement changes nothing and makes no call.
pub async fn apply_statement(
    llm: &dyn ChatCompletion,
    profile: &Profile,
    statement: &str,
    timeouts: &CallTimeouts,
) -> LlmResult<MirrorUpdate> {
    let statement = statement.trim();
    if statement.is_empty() {
        return Ok(MirrorUpdate {
            profile: profile.clone(),
            changed_fields: Vec::new(),
        });
    }

    let profile_json = serde_json::to_string_pretty(&profile.to_value())
        .map_err(|e| LlmError::Prompt(e.to_string()))?;
    let prompt = render_builtin(
        MIRROR_PATCH,
        &json!({ "profile_json": profile_json, "statement": statement }),
    )
    .map_err(LlmError::Prompt)?;

    let raw = llm
        .complete(
            &[ConversationTurn::user(prompt)],
            &timeouts.options(CallKind::Mirror),
        )
        .await?;

    let patch = match find_json_object(&raw) {
        Some(Value::Object(patch)) => patch,
        _ => {
            return Err(LlmError::InvalidResponse(format!(
                "no JSON patch in reply: {}",
                preview(&raw, 200)
            )))
        }
    };

    let mut updated = profile.clone();
    let changed_fields = updated.apply_patch(&patch);
    log::info!("Mirror update changed {:?}", changed_fields);

    Ok(MirrorUpdate {
        profile: updated,
        changed_fields,
    })
}
