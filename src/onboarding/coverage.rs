// Coverage evaluation: rubric-graded completeness of a transcript

use crate::llm::{CallKind, CallTimeouts, ChatCompletion};
use crate::models::{Conversation, ConversationTurn, CoverageReport};
use crate::parsers::find_json_object;
use crate::templates::builtin::COVERAGE_RUBRIC;
use crate::templates::render_builtin;
use crate::utils::preview;
use serde_json::json;

/// Parse a coverage reply, tolerating prose and code fences around the JSON
pub fn parse_report(raw: &str) -> Option<CoverageReport> {
    let value = find_json_object(raw)?;
    serde_json::from_value(value).ok()
}

/// Grade the transcript against the coverage rubric.
///
/// Never fails: any call or parse problem yields the conservative report
/// (every category "Missing", `enough_to_stop == false`).
pub async fn evaluate(
    llm: &dyn ChatCompletion,
    conversation: &Conversation,
    timeouts: &CallTimeouts,
) -> CoverageReport {
    let prompt = match render_builtin(
        COVERAGE_RUBRIC,
        &json!({ "transcript": conversation.render_transcript() }),
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            log::warn!("Coverage prompt unavailable: {}", e);
            return CoverageReport::conservative();
        }
    };

    let turns = [ConversationTurn::user(prompt)];
    let raw = match llm
        .complete(&turns, &timeouts.options(CallKind::Coverage))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Coverage call failed, assuming nothing covered: {}", e);
            return CoverageReport::conservative();
        }
    };

    match parse_report(&raw) {
        Some(report) => {
            log::debug!(
                "Coverage: enough_to_stop={}, missing={:?}",
                report.enough_to_stop,
                report.missing_categories()
            );
            report
        }
        None => {
            log::warn!("Unparseable coverage reply: {}", preview(&raw, 200));
            CoverageReport::conservative()
        }
    }
}
