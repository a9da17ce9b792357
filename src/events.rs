// Event types and payload structures for real-time updates
// These are broadcast via WebSocket to connected clients

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// User-visible notices (toasts)
pub const EVENT_NOTICE_TRANSIENT_ERROR: &str = "notice:transient_error";
pub const EVENT_NOTICE_PERSIST_FAILED: &str = "notice:persist_failed";
pub const EVENT_NOTICE_SYNTHESIS_FAILED: &str = "notice:synthesis_failed";
pub const EVENT_NOTICE_CONNECTION_FAILED: &str = "notice:connection_failed";

// Onboarding lifecycle
pub const EVENT_ONBOARDING_STATE_CHANGED: &str = "onboarding:state_changed";
pub const EVENT_ONBOARDING_COMPLETED: &str = "onboarding:completed";
pub const EVENT_PROFILE_UPDATED: &str = "profile:updated";
pub const EVENT_CONNECTION_STORED: &str = "connection:stored";

/// Payload for user-visible notices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Text suitable for a toast
    pub message: String,
    /// Underlying error, for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NoticePayload {
    pub fn for_session(session_id: &str, message: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            user_id: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn for_user(user_id: &str, message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            user_id: Some(user_id.to_string()),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// Payload for onboarding state change events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedPayload {
    pub session_id: String,
    pub old_state: String,
    pub new_state: String,
}

/// Payload for onboarding completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingCompletedPayload {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub persisted: bool,
    pub answer_count: usize,
}

/// Payload for a stored provider summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStoredPayload {
    pub user_id: String,
    pub provider: String,
}

/// Destination for events raised by the onboarding components.
///
/// The server implements this with its WebSocket broadcaster.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

/// Serialize a payload and emit it
pub fn emit_event<P: Serialize>(sink: &dyn EventSink, event: &str, payload: &P) {
    match serde_json::to_value(payload) {
        Ok(value) => sink.emit(event, value),
        Err(e) => log::warn!("Failed to serialize {} payload: {}", event, e),
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &str, _payload: serde_json::Value) {}
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|(name, _)| name == event).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.to_string(), payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_payload_serialization() {
        let payload = NoticePayload::for_session("s1", "Something went wrong").with_detail("timeout");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["detail"], "timeout");
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        emit_event(
            &sink,
            EVENT_NOTICE_TRANSIENT_ERROR,
            &NoticePayload::for_session("s1", "a"),
        );
        emit_event(
            &sink,
            EVENT_ONBOARDING_COMPLETED,
            &OnboardingCompletedPayload {
                session_id: "s1".to_string(),
                user_id: None,
                persisted: false,
                answer_count: 20,
            },
        );

        assert_eq!(
            sink.names(),
            vec![EVENT_NOTICE_TRANSIENT_ERROR, EVENT_ONBOARDING_COMPLETED]
        );
        assert_eq!(sink.count(EVENT_ONBOARDING_COMPLETED), 1);
    }
}
