//! Persistence sync: store the finished profile under the user's record
//!
//! Persistence is a side effect of completing onboarding, never a
//! precondition for showing the profile. Failures are logged and surfaced as
//! a notice; the caller keeps the profile it already has.

use crate::events::{emit_event, EventSink, NoticePayload, EVENT_NOTICE_PERSIST_FAILED};
use crate::models::{Conversation, Profile, PromptMode, SessionContext, UserRecord};
use crate::storage::{DraftStore, ProfileStore};
use crate::utils::{retry_async, RetryPolicy};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Persisted { user_id: String },
    /// No authenticated user yet; the draft is kept for a later sync
    Unauthenticated,
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, SyncOutcome::Persisted { .. })
    }
}

/// Build the record written for a completed onboarding
pub fn build_record(
    user_id: &str,
    profile: &Profile,
    conversation: &Conversation,
    mode: PromptMode,
) -> UserRecord {
    UserRecord {
        user_id: user_id.to_string(),
        profile_data: profile.to_value(),
        onboarding_conversation: serde_json::to_value(conversation)
            .unwrap_or(serde_json::Value::Null),
        prompt_mode: Some(mode.as_str().to_string()),
        has_completed_onboarding: true,
        updated_at: Some(chrono::Utc::now().to_rfc3339()),
    }
}

pub struct PersistenceSync {
    store: Arc<dyn ProfileStore>,
    drafts: Option<DraftStore>,
    retry: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl PersistenceSync {
    pub fn new(store: Arc<dyn ProfileStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            drafts: None,
            retry: RetryPolicy::default(),
            events,
        }
    }

    pub fn with_drafts(mut self, drafts: DraftStore) -> Self {
        self.drafts = Some(drafts);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Upsert `{profile, transcript, mode, completed, updated_at}` for the
    /// authenticated user, then clear the session's draft.
    ///
    /// Safe to call repeatedly: the record is keyed by user id, so a second
    /// call replaces the first.
    pub async fn sync(
        &self,
        ctx: &SessionContext,
        session_id: Option<&str>,
        profile: &Profile,
        conversation: &Conversation,
        mode: PromptMode,
    ) -> SyncOutcome {
        let Some(user_id) = ctx.user_id() else {
            log::info!("Onboarding finished without a signed-in user; keeping draft");
            return SyncOutcome::Unauthenticated;
        };

        let record = build_record(user_id, profile, conversation, mode);
        let outcome = self.upsert(&record).await;

        if outcome.is_persisted() {
            if let (Some(drafts), Some(session_id)) = (&self.drafts, session_id) {
                if let Err(e) = drafts.clear(session_id) {
                    log::warn!("Failed to clear draft {}: {}", session_id, e);
                }
            }
        }
        outcome
    }

    /// Replace only the stored profile, keeping transcript and mode
    pub async fn update_profile(&self, ctx: &SessionContext, profile: &Profile) -> SyncOutcome {
        let Some(user_id) = ctx.user_id() else {
            return SyncOutcome::Unauthenticated;
        };

        let existing = match self.store.get(user_id).await {
            Ok(existing) => existing,
            Err(e) => return self.failed(user_id, e.to_string()),
        };

        let record = match existing {
            Some(mut record) => {
                record.profile_data = profile.to_value();
                record.updated_at = Some(chrono::Utc::now().to_rfc3339());
                record
            }
            None => UserRecord {
                user_id: user_id.to_string(),
                profile_data: profile.to_value(),
                onboarding_conversation: serde_json::Value::Null,
                prompt_mode: None,
                has_completed_onboarding: true,
                updated_at: Some(chrono::Utc::now().to_rfc3339()),
            },
        };
        self.upsert(&record).await
    }

    async fn upsert(&self, record: &UserRecord) -> SyncOutcome {
        let store = &self.store;
        let label = format!("Profile upsert for {} ({})", record.user_id, store.name());
        match retry_async(&self.retry, &label, move |_| store.upsert(record)).await {
            Ok(()) => {
                log::info!("Persisted profile for user {}", record.user_id);
                SyncOutcome::Persisted {
                    user_id: record.user_id.clone(),
                }
            }
            Err(e) => self.failed(&record.user_id, e.to_string()),
        }
    }

    fn failed(&self, user_id: &str, reason: String) -> SyncOutcome {
        log::error!("Failed to persist profile for {}: {}", user_id, reason);
        emit_event(
            self.events.as_ref(),
            EVENT_NOTICE_PERSIST_FAILED,
            &NoticePayload::for_user(
                user_id,
                "We couldn't save your profile just now. It's still here, and we'll try again.",
            )
            .with_detail(&reason),
        );
        SyncOutcome::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::models::{InputChannel, OnboardingSession};
    use crate::storage::MemoryProfileStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn conversation() -> Conversation {
        let mut conversation = Conversation::new("persona");
        conversation.push_user("I'm Ada");
        conversation
    }

    fn profile(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            ..Profile::fallback()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::linear(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_sync_twice_keeps_one_record_second_wins() {
        let store = Arc::new(MemoryProfileStore::new());
        let sync = PersistenceSync::new(store.clone(), Arc::new(RecordingSink::new()));
        let ctx = SessionContext::for_user("user-1");

        let first = sync
            .sync(&ctx, None, &profile("Ada"), &conversation(), PromptMode::Standard)
            .await;
        let second = sync
            .sync(&ctx, None, &profile("Ada L."), &conversation(), PromptMode::Deep)
            .await;

        assert!(first.is_persisted());
        assert!(second.is_persisted());
        assert_eq!(store.len().await, 1);

        let record = store.get("user-1").await.unwrap().unwrap();
        assert_eq!(record.profile_data["name"], "Ada L.");
        assert_eq!(record.prompt_mode.as_deref(), Some("deep"));
        assert!(record.has_completed_onboarding);
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_anonymous_sync_keeps_draft() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path());
        let session = OnboardingSession::new(
            "s1".to_string(),
            PromptMode::Standard,
            InputChannel::Text,
            conversation(),
        );
        drafts.save(&session).unwrap();

        let store = Arc::new(MemoryProfileStore::new());
        let sync = PersistenceSync::new(store.clone(), Arc::new(RecordingSink::new()))
            .with_drafts(drafts.clone());

        let outcome = sync
            .sync(
                &SessionContext::anonymous(),
                Some("s1"),
                &profile("Ada"),
                &session.conversation,
                session.mode,
            )
            .await;

        assert_eq!(outcome, SyncOutcome::Unauthenticated);
        assert!(drafts.load("s1").unwrap().is_some());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_success_clears_draft() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path());
        let session = OnboardingSession::new(
            "s2".to_string(),
            PromptMode::Playful,
            InputChannel::Text,
            conversation(),
        );
        drafts.save(&session).unwrap();

        let sync = PersistenceSync::new(
            Arc::new(MemoryProfileStore::new()),
            Arc::new(RecordingSink::new()),
        )
        .with_drafts(drafts.clone());

        let outcome = sync
            .sync(
                &SessionContext::for_user("u2"),
                Some("s2"),
                &profile("Bo"),
                &session.conversation,
                session.mode,
            )
            .await;

        assert!(outcome.is_persisted());
        assert!(drafts.load("s2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryProfileStore::new());
        store.fail_next_writes(2);
        let sync = PersistenceSync::new(store.clone(), Arc::new(RecordingSink::new()))
            .with_retry(fast_retry());

        let outcome = sync
            .sync(
                &SessionContext::for_user("u3"),
                None,
                &profile("Cy"),
                &conversation(),
                PromptMode::Standard,
            )
            .await;

        assert!(outcome.is_persisted());
        assert_eq!(store.write_count(), 3);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_failure_and_notify() {
        let store = Arc::new(MemoryProfileStore::new());
        store.fail_next_writes(5);
        let events = Arc::new(RecordingSink::new());
        let sync = PersistenceSync::new(store.clone(), events.clone()).with_retry(fast_retry());

        let outcome = sync
            .sync(
                &SessionContext::for_user("u4"),
                None,
                &profile("Di"),
                &conversation(),
                PromptMode::Standard,
            )
            .await;

        assert!(matches!(outcome, SyncOutcome::Failed { .. }));
        assert_eq!(events.count(EVENT_NOTICE_PERSIST_FAILED), 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_update_profile_keeps_transcript() {
        let store = Arc::new(MemoryProfileStore::new());
        let sync = PersistenceSync::new(store.clone(), Arc::new(RecordingSink::new()));
        let ctx = SessionContext::for_user("u5");

        sync.sync(&ctx, None, &profile("Eve"), &conversation(), PromptMode::Deep)
            .await;
        let outcome = sync.update_profile(&ctx, &profile("Eve R.")).await;

        assert!(outcome.is_persisted());
        let record = store.get("u5").await.unwrap().unwrap();
        assert_eq!(record.profile_data["name"], "Eve R.");
        assert_eq!(record.prompt_mode.as_deref(), Some("deep"));
        assert_eq!(
            record.onboarding_conversation["userAnswers"][0],
            "I'm Ada"
        );
    }
}
