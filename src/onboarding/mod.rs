//! Onboarding conversation flow
//!
//! - `orchestrator` decides, per user message, whether to continue or finish
//! - `policy` holds the two stop policies (fixed cap, coverage gated)
//! - `coverage` grades a transcript against the rubric
//! - `synthesis` turns a transcript into a `Profile`
//! - `persistence` upserts the result under the user's record
//! - `mirror` applies free-text corrections to a finished profile
//! - `sessions` keeps live sessions and their on-disk drafts

pub mod coverage;
pub mod mirror;
pub mod orchestrator;
pub mod persistence;
pub mod policy;
pub mod sessions;
pub mod sms;
pub mod synthesis;

pub use mirror::{apply_statement, MirrorUpdate};
pub use orchestrator::{TurnOrchestrator, TurnOutcome};
pub use persistence::{PersistenceSync, SyncOutcome};
pub use policy::{PolicyKind, SoftStopConfig, StopDecision, StopPolicy};
pub use sessions::SessionRegistry;
pub use sms::{HttpSmsEcho, SmsEcho};

use crate::models::{Conversation, InputChannel, OnboardingSession, PromptMode};
use crate::templates::{opening_message, persona_prompt};

/// A fresh conversation in `mode`: persona system turn plus the opening greeting
pub fn new_conversation(mode: PromptMode) -> Conversation {
    let mut conversation = Conversation::new(persona_prompt(mode));
    conversation.push_assistant(opening_message(mode));
    conversation
}

/// A new session with a random id
pub fn new_session(mode: PromptMode, channel: InputChannel) -> OnboardingSession {
    OnboardingSession::new(
        uuid::Uuid::new_v4().to_string(),
        mode,
        channel,
        new_conversation(mode),
    )
}
