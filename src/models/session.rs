// Session Models - onboarding drafts, session context and persisted user records

use super::conversation::{Conversation, InputChannel, PromptMode};
use super::profile::Profile;
use super::state_machine::OnboardingState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The caller's identity, threaded explicitly into every component that
/// touches the backend user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    /// Authenticated user id, if the caller has an account
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// An onboarding conversation in progress.
///
/// Stored as a draft until the profile is persisted to the user's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSession {
    pub id: String,
    pub mode: PromptMode,
    #[serde(default)]
    pub channel: InputChannel,
    pub conversation: Conversation,
    #[serde(default)]
    pub state: OnboardingState,
    #[serde(default)]
    pub profile: Option<Profile>,
    /// Synthesis attempts that failed since the conversation last (re)started
    #[serde(default)]
    pub synthesis_failures: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl OnboardingSession {
    pub fn new(id: String, mode: PromptMode, channel: InputChannel, conversation: Conversation) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            mode,
            channel,
            conversation,
            state: OnboardingState::Active,
            profile: None,
            synthesis_failures: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Start over in a different persona. The old transcript is discarded.
    pub fn switch_mode(&mut self, mode: PromptMode, conversation: Conversation) {
        self.mode = mode;
        self.conversation = conversation;
        self.state = OnboardingState::Active;
        self.profile = None;
        self.synthesis_failures = 0;
        self.touch();
    }
}

/// The backend user record this crate reads and upserts.
///
/// Keyed uniquely by `user_id`; every other column is owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub profile_data: Value,
    #[serde(default)]
    pub onboarding_conversation: Value,
    #[serde(default)]
    pub prompt_mode: Option<String>,
    #[serde(default)]
    pub has_completed_onboarding: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl UserRecord {
    /// Whether the stored profile has any content (used for new-user routing)
    pub fn has_profile(&self) -> bool {
        match &self.profile_data {
            Value::Object(map) => map.values().any(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                _ => true,
            }),
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty() && s.trim() != "{}",
            _ => true,
        }
    }

    /// Decode the stored profile into the fixed schema
    pub fn profile(&self) -> Option<Profile> {
        if !self.has_profile() {
            return None;
        }
        Some(Profile::from_llm_value(&self.profile_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(profile_data: Value) -> UserRecord {
        UserRecord {
            user_id: "u1".to_string(),
            profile_data,
            onboarding_conversation: Value::Null,
            prompt_mode: None,
            has_completed_onboarding: false,
            updated_at: None,
        }
    }

    #[test]
    fn test_has_profile_emptiness_check() {
        assert!(!record(Value::Null).has_profile());
        assert!(!record(json!({})).has_profile());
        assert!(!record(json!({ "name": "", "interests": [] })).has_profile());
        assert!(record(json!({ "name": "Kai" })).has_profile());
    }

    #[test]
    fn test_profile_decodes_stored_data() {
        let rec = record(json!({ "name": "Kai", "twyneTags": ["Builder"] }));
        let profile = rec.profile().unwrap();
        assert_eq!(profile.name, "Kai");
        assert_eq!(profile.twyne_tags, vec!["Builder"]);
    }

    #[test]
    fn test_user_record_uses_id_column() {
        let json = serde_json::to_value(record(Value::Null)).unwrap();
        assert_eq!(json["id"], "u1");
    }

    #[test]
    fn test_session_context_blank_user_is_anonymous() {
        let ctx = SessionContext::for_user("  ");
        assert_eq!(ctx.user_id(), None);
        assert_eq!(SessionContext::for_user("abc").user_id(), Some("abc"));
    }
}
