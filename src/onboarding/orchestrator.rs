//! Turn orchestration: what happens after each user message
//!
//! One call to [`TurnOrchestrator::handle_user_message`] appends exactly one
//! user turn and then either asks for the next assistant turn or ends the
//! conversation (synthesis, closing message, persistence). The caller holds
//! the session exclusively for the duration of the call.

use super::coverage;
use super::persistence::PersistenceSync;
use super::policy::{StopDecision, StopPolicy};
use super::sms::SmsEcho;
use super::synthesis;
use crate::events::{
    emit_event, EventSink, NoticePayload, OnboardingCompletedPayload, StateChangedPayload,
    EVENT_NOTICE_SYNTHESIS_FAILED, EVENT_NOTICE_TRANSIENT_ERROR, EVENT_ONBOARDING_COMPLETED,
    EVENT_ONBOARDING_STATE_CHANGED,
};
use crate::llm::{CallKind, CallTimeouts, ChatCompletion, LlmError, LlmResult};
use crate::models::state_machine::transition_state;
use crate::models::{
    Conversation, CoverageReport, InputChannel, OnboardingSession, OnboardingState, Profile,
    SessionContext, StopReason, TransitionError,
};
use crate::templates::{CLOSING_MESSAGE, FALLBACK_REPLY};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Result of handling one user message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Blank input; nothing changed
    Ignored,
    /// The conversation goes on with `reply`
    Continued {
        reply: String,
        progress: f64,
        /// `reply` is the apology substituted for a failed turn
        fallback: bool,
    },
    /// Onboarding finished with a profile
    Completed { profile: Profile, persisted: bool },
    /// Synthesis kept failing; only a forced finish or a restart is possible
    Failed { reason: String },
}

/// Failed synthesis attempts before a session stops resuming the conversation
pub const MAX_SYNTHESIS_FAILURES: u32 = 3;

pub struct TurnOrchestrator {
    llm: Arc<dyn ChatCompletion>,
    sms: Option<Arc<dyn SmsEcho>>,
    policy: StopPolicy,
    timeouts: CallTimeouts,
    persistence: Arc<PersistenceSync>,
    events: Arc<dyn EventSink>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl TurnOrchestrator {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        persistence: Arc<PersistenceSync>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            llm,
            sms: None,
            policy: StopPolicy::default(),
            timeouts: CallTimeouts::default(),
            persistence,
            events,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    pub fn with_policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsEcho>) -> Self {
        self.sms = Some(sms);
        self
    }

    /// Replace the soft-stop random source
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn policy(&self) -> &StopPolicy {
        &self.policy
    }

    pub fn llm(&self) -> &Arc<dyn ChatCompletion> {
        &self.llm
    }

    pub fn timeouts(&self) -> &CallTimeouts {
        &self.timeouts
    }

    pub fn persistence(&self) -> &Arc<PersistenceSync> {
        &self.persistence
    }

    /// Fraction of the turn budget used, for the progress indicator
    pub fn progress(&self, conversation: &Conversation) -> f64 {
        let max_turns = self.policy.max_turns();
        if max_turns == 0 {
            return 1.0;
        }
        (conversation.answer_count() as f64 / max_turns as f64).min(1.0)
    }

    /// Grade the session's transcript on demand
    pub async fn coverage(&self, session: &OnboardingSession) -> CoverageReport {
        coverage::evaluate(self.llm.as_ref(), &session.conversation, &self.timeouts).await
    }

    /// Handle one user message.
    ///
    /// Blank input is ignored without touching the transcript. Only `Active`
    /// sessions accept input.
    pub async fn handle_user_message(
        &self,
        session: &mut OnboardingSession,
        text: &str,
        ctx: &SessionContext,
    ) -> Result<TurnOutcome, TransitionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }
        self.recover_interrupted(session)?;
        if !session.state.accepts_input() {
            return Err(TransitionError::AlreadyTerminal(
                session.state.name().to_string(),
            ));
        }

        // Answers past the cap follow a failed synthesis; the policy stops again
        session.conversation.push_user(text);
        session.touch();
        let answers = session.conversation.answer_count();

        let report = if self.policy.needs_coverage(answers) {
            Some(self.coverage(session).await)
        } else {
            None
        };

        let decision = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.policy.decide(answers, report.as_ref(), &mut **rng)
        };

        match decision {
            StopDecision::Continue => Ok(self.continue_turn(session).await),
            StopDecision::Stop(reason) => {
                log::info!(
                    "Session {} stopping after {} answers ({:?})",
                    session.id,
                    answers,
                    reason
                );
                self.terminate(session, ctx, reason).await
            }
        }
    }

    /// End the conversation now, whatever the policy says.
    ///
    /// Synthesis failures fall back to the minimal profile here. A completed
    /// session whose persistence failed is re-persisted instead.
    pub async fn finish_now(
        &self,
        session: &mut OnboardingSession,
        ctx: &SessionContext,
    ) -> Result<TurnOutcome, TransitionError> {
        self.recover_interrupted(session)?;
        match &session.state {
            OnboardingState::Active | OnboardingState::Failed { .. } => {
                self.set_state(
                    session,
                    OnboardingState::Synthesizing {
                        reason: StopReason::Requested,
                    },
                )?;
                let profile = synthesis::synthesize_or_fallback(
                    self.llm.as_ref(),
                    &session.conversation,
                    &self.timeouts,
                )
                .await;
                self.complete(session, ctx, profile).await
            }
            OnboardingState::Complete { persisted: false } => {
                self.retry_persist(session, ctx).await
            }
            OnboardingState::Complete { persisted: true } => Ok(TurnOutcome::Completed {
                profile: session.profile.clone().unwrap_or_else(Profile::fallback),
                persisted: true,
            }),
            OnboardingState::Synthesizing { .. } => Err(TransitionError::AlreadyTerminal(
                session.state.name().to_string(),
            )),
        }
    }

    /// Settle a session left in `Synthesizing` by a turn that never finished.
    ///
    /// Callers hold the session lock, so a `Synthesizing` state seen here
    /// belongs to a request that was dropped mid-call. With a profile already
    /// attached only the write is missing; otherwise the conversation resumes.
    /// Returns whether anything changed.
    pub fn recover_interrupted(
        &self,
        session: &mut OnboardingSession,
    ) -> Result<bool, TransitionError> {
        if !matches!(session.state, OnboardingState::Synthesizing { .. }) {
            return Ok(false);
        }
        let target = if session.profile.is_some() {
            OnboardingState::Complete { persisted: false }
        } else {
            OnboardingState::Active
        };
        log::warn!(
            "Session {} was interrupted while synthesizing; moving to {}",
            session.id,
            target.name()
        );
        self.set_state(session, target)?;
        Ok(true)
    }

    /// Persist the already-synthesized profile of a `Complete { persisted: false }` session
    pub async fn retry_persist(
        &self,
        session: &mut OnboardingSession,
        ctx: &SessionContext,
    ) -> Result<TurnOutcome, TransitionError> {
        let profile = session.profile.clone().unwrap_or_else(Profile::fallback);
        let outcome = self
            .persistence
            .sync(
                ctx,
                Some(&session.id),
                &profile,
                &session.conversation,
                session.mode,
            )
            .await;
        let persisted = outcome.is_persisted();
        self.set_state(session, OnboardingState::Complete { persisted })?;
        Ok(TurnOutcome::Completed { profile, persisted })
    }

    async fn terminate(
        &self,
        session: &mut OnboardingSession,
        ctx: &SessionContext,
        reason: StopReason,
    ) -> Result<TurnOutcome, TransitionError> {
        self.set_state(session, OnboardingState::Synthesizing { reason })?;

        // The closing line is only added once there is a profile to show
        match synthesis::synthesize(self.llm.as_ref(), &session.conversation, &self.timeouts).await
        {
            Ok(profile) => self.complete(session, ctx, profile).await,
            Err(e) => {
                session.synthesis_failures += 1;
                log::warn!(
                    "Synthesis failed for session {} (attempt {}): {}",
                    session.id,
                    session.synthesis_failures,
                    e
                );

                if session.synthesis_failures >= MAX_SYNTHESIS_FAILURES {
                    emit_event(
                        self.events.as_ref(),
                        EVENT_NOTICE_SYNTHESIS_FAILED,
                        &NoticePayload::for_session(
                            &session.id,
                            "We still couldn't put your profile together. Finish now for a basic profile, or start over.",
                        )
                        .with_detail(&e),
                    );
                    let reason = e.to_string();
                    self.set_state(
                        session,
                        OnboardingState::Failed {
                            reason: reason.clone(),
                        },
                    )?;
                    return Ok(TurnOutcome::Failed { reason });
                }

                emit_event(
                    self.events.as_ref(),
                    EVENT_NOTICE_SYNTHESIS_FAILED,
                    &NoticePayload::for_session(
                        &session.id,
                        "We couldn't put your profile together yet. Let's keep chatting for a moment.",
                    )
                    .with_detail(&e),
                );
                self.set_state(session, OnboardingState::Active)?;
                Ok(self.continue_turn(session).await)
            }
        }
    }

    async fn complete(
        &self,
        session: &mut OnboardingSession,
        ctx: &SessionContext,
        profile: Profile,
    ) -> Result<TurnOutcome, TransitionError> {
        self.append_closing(&mut session.conversation);
        session.profile = Some(profile.clone());

        let outcome = self
            .persistence
            .sync(
                ctx,
                Some(&session.id),
                &profile,
                &session.conversation,
                session.mode,
            )
            .await;
        let persisted = outcome.is_persisted();
        self.set_state(session, OnboardingState::Complete { persisted })?;

        emit_event(
            self.events.as_ref(),
            EVENT_ONBOARDING_COMPLETED,
            &OnboardingCompletedPayload {
                session_id: session.id.clone(),
                user_id: ctx.user_id().map(str::to_string),
                persisted,
                answer_count: session.conversation.answer_count(),
            },
        );

        Ok(TurnOutcome::Completed { profile, persisted })
    }

    async fn continue_turn(&self, session: &mut OnboardingSession) -> TurnOutcome {
        let (reply, fallback) = match self.next_assistant_turn(session).await {
            Ok(reply) if !reply.trim().is_empty() => (reply.trim().to_string(), false),
            Ok(_) => {
                self.notify_transient(session, &LlmError::EmptyResponse);
                (FALLBACK_REPLY.to_string(), true)
            }
            Err(e) => {
                self.notify_transient(session, &e);
                (FALLBACK_REPLY.to_string(), true)
            }
        };

        session.conversation.push_assistant(&reply);
        session.touch();

        TurnOutcome::Continued {
            reply,
            progress: self.progress(&session.conversation),
            fallback,
        }
    }

    async fn next_assistant_turn(&self, session: &OnboardingSession) -> LlmResult<String> {
        let turns = &session.conversation.turns;
        match session.channel {
            InputChannel::Text => {
                self.llm
                    .complete(turns, &self.timeouts.options(CallKind::Turn))
                    .await
            }
            InputChannel::Sms => match &self.sms {
                Some(sms) => sms.echo(&session.id, turns).await,
                None => Err(LlmError::Request(
                    "SMS channel is not configured".to_string(),
                )),
            },
        }
    }

    fn append_closing(&self, conversation: &mut Conversation) {
        let already_closed = conversation
            .messages
            .last()
            .map(|m| m.text == CLOSING_MESSAGE)
            .unwrap_or(false);
        if !already_closed {
            conversation.push_assistant(CLOSING_MESSAGE);
        }
    }

    fn notify_transient(&self, session: &OnboardingSession, error: &LlmError) {
        log::warn!("Assistant turn failed for session {}: {}", session.id, error);
        emit_event(
            self.events.as_ref(),
            EVENT_NOTICE_TRANSIENT_ERROR,
            &NoticePayload::for_session(&session.id, "Connection hiccup, please try again.")
                .with_detail(error),
        );
    }

    fn set_state(
        &self,
        session: &mut OnboardingSession,
        target: OnboardingState,
    ) -> Result<(), TransitionError> {
        let next = transition_state(&session.state, target)?;
        let old = session.state.name();
        if old != next.name() {
            emit_event(
                self.events.as_ref(),
                EVENT_ONBOARDING_STATE_CHANGED,
                &StateChangedPayload {
                    session_id: session.id.clone(),
                    old_state: old.to_string(),
                    new_state: next.name().to_string(),
                },
            );
        }
        session.state = next;
        session.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RecordingSink, EVENT_NOTICE_PERSIST_FAILED};
    use crate::llm::ScriptedLlm;
    use crate::models::{MessageRole, PromptMode};
    use crate::onboarding::new_session;
    use crate::onboarding::policy::SoftStopConfig;
    use crate::storage::{MemoryProfileStore, ProfileStore};
    use crate::utils::RetryPolicy;
    use async_trait::async_trait;
    use rand::rngs::mock::StepRng;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const PROFILE_REPLY: &str =
        r#"Here's the profile: {"name": "Mia", "twyneTags": ["Runner"]} Hope that helps!"#;

    struct Harness {
        llm: Arc<ScriptedLlm>,
        store: Arc<MemoryProfileStore>,
        events: Arc<RecordingSink>,
        orchestrator: TurnOrchestrator,
    }

    fn harness(llm: ScriptedLlm, rng: StepRng) -> Harness {
        let llm = Arc::new(llm);
        harness_over(llm.clone(), llm, rng)
    }

    /// Harness whose orchestrator talks to `provider`; `llm` only records calls
    fn harness_over(
        llm: Arc<ScriptedLlm>,
        provider: Arc<dyn ChatCompletion>,
        rng: StepRng,
    ) -> Harness {
        let store = Arc::new(MemoryProfileStore::new());
        let events = Arc::new(RecordingSink::new());
        let persistence = Arc::new(
            PersistenceSync::new(store.clone(), events.clone())
                .with_retry(RetryPolicy::linear(2, Duration::from_millis(1))),
        );
        let orchestrator = TurnOrchestrator::new(provider, persistence, events.clone())
            .with_rng(Box::new(rng));
        Harness {
            llm,
            store,
            events,
            orchestrator,
        }
    }

    fn never_soft_stop() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    fn always_soft_stop() -> StepRng {
        StepRng::new(0, 0)
    }

    fn chatty_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .with_default(CallKind::Turn, "Tell me more!")
            .with_default(CallKind::Synthesis, PROFILE_REPLY)
    }

    fn user() -> SessionContext {
        SessionContext::for_user("user-42")
    }

    fn capped_at(max_turns: usize) -> StopPolicy {
        StopPolicy::FixedCap(SoftStopConfig {
            max_turns,
            ..SoftStopConfig::default()
        })
    }

    fn closing_count(session: &OnboardingSession) -> usize {
        session
            .conversation
            .messages
            .iter()
            .filter(|m| m.text == CLOSING_MESSAGE)
            .count()
    }

    /// Delegates to a scripted provider, but the first synthesis call hangs
    struct StallingSynthesis {
        inner: Arc<ScriptedLlm>,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl ChatCompletion for StallingSynthesis {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn complete(
            &self,
            turns: &[crate::models::ConversationTurn],
            options: &crate::llm::CompletionOptions,
        ) -> LlmResult<String> {
            if options.kind == CallKind::Synthesis && !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.inner.complete(turns, options).await
        }
    }

    fn stalling_harness() -> Harness {
        let llm = Arc::new(chatty_llm());
        let provider = Arc::new(StallingSynthesis {
            inner: llm.clone(),
            stalled: AtomicBool::new(false),
        });
        let mut h = harness_over(llm, provider, never_soft_stop());
        h.orchestrator = h.orchestrator.with_policy(capped_at(1));
        h
    }

    #[tokio::test]
    async fn test_blank_input_is_a_no_op() {
        let h = harness(chatty_llm(), never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);
        let before = session.conversation.clone();

        for blank in ["", "   ", "\n\t "] {
            let outcome = h
                .orchestrator
                .handle_user_message(&mut session, blank, &user())
                .await
                .unwrap();
            assert!(matches!(outcome, TurnOutcome::Ignored));
        }

        assert_eq!(session.conversation, before);
        assert!(h.llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_turn_appends_user_and_assistant() {
        let h = harness(chatty_llm(), never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "  I'm Mia from Oslo ", &user())
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Continued {
                reply,
                progress,
                fallback,
            } => {
                assert_eq!(reply, "Tell me more!");
                assert!((progress - 0.05).abs() < 1e-9);
                assert!(!fallback);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.conversation.user_answers, vec!["I'm Mia from Oslo"]);
        let last = session.conversation.turns.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(session.state, OnboardingState::Active);
    }

    #[tokio::test]
    async fn test_failed_turn_appends_fallback_and_notifies() {
        let llm = ScriptedLlm::new()
            .failing(CallKind::Turn, LlmError::Timeout(Duration::from_secs(30)));
        let h = harness(llm, never_soft_stop());
        let mut session = new_session(PromptMode::Playful, InputChannel::Text);
        let turns_before = session.conversation.turns.len();

        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "hello", &user())
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Continued { fallback: true, .. }));
        assert_eq!(session.conversation.turns.len(), turns_before + 2);
        assert_eq!(
            session.conversation.turns.last().unwrap().content,
            FALLBACK_REPLY
        );
        assert_eq!(h.events.count(EVENT_NOTICE_TRANSIENT_ERROR), 1);
        assert!(session.state.accepts_input());
    }

    #[tokio::test]
    async fn test_blank_reply_is_treated_as_failure() {
        let llm = ScriptedLlm::new().with_default(CallKind::Turn, "   \n");
        let h = harness(llm, never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        h.orchestrator
            .handle_user_message(&mut session, "hi", &user())
            .await
            .unwrap();

        assert_eq!(
            session.conversation.turns.last().unwrap().content,
            FALLBACK_REPLY
        );
        assert_eq!(h.events.count(EVENT_NOTICE_TRANSIENT_ERROR), 1);
    }

    #[tokio::test]
    async fn test_twenty_answers_complete_once() {
        let h = harness(chatty_llm(), never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let mut last = TurnOutcome::Ignored;
        for i in 1..=20 {
            last = h
                .orchestrator
                .handle_user_message(&mut session, &format!("answer number {}", i), &user())
                .await
                .unwrap();
        }

        match last {
            TurnOutcome::Completed { profile, persisted } => {
                assert_eq!(profile.name, "Mia");
                assert!(persisted);
            }
            other => panic!("expected completion, got {:?}", other),
        }

        let closings = session
            .conversation
            .messages
            .iter()
            .filter(|m| m.text == CLOSING_MESSAGE)
            .count();
        assert_eq!(closings, 1);
        assert_eq!(
            session.conversation.messages.last().unwrap().text,
            CLOSING_MESSAGE
        );
        assert_eq!(session.conversation.answer_count(), 20);
        assert_eq!(h.llm.call_count(CallKind::Turn), 19);
        assert_eq!(h.llm.call_count(CallKind::Synthesis), 1);
        assert_eq!(h.store.write_count(), 1);
        assert_eq!(session.state, OnboardingState::Complete { persisted: true });
        assert_eq!(h.events.count(EVENT_ONBOARDING_COMPLETED), 1);

        let err = h
            .orchestrator
            .handle_user_message(&mut session, "one more thing", &user())
            .await;
        assert!(err.is_err());
        assert_eq!(session.conversation.answer_count(), 20);
    }

    #[tokio::test]
    async fn test_soft_stop_at_fifteen() {
        let h = harness(chatty_llm(), always_soft_stop());
        let mut session = new_session(PromptMode::Deep, InputChannel::Text);

        for i in 1..=14 {
            let outcome = h
                .orchestrator
                .handle_user_message(&mut session, &format!("a{}", i), &user())
                .await
                .unwrap();
            assert!(matches!(outcome, TurnOutcome::Continued { .. }));
        }
        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "a15", &user())
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(session.conversation.answer_count(), 15);
    }

    #[tokio::test]
    async fn test_synthesis_failure_resumes_conversation() {
        let llm = ScriptedLlm::new()
            .with_default(CallKind::Turn, "Let's keep going!")
            .with_default(CallKind::Synthesis, PROFILE_REPLY);
        llm.push(CallKind::Synthesis, Err(LlmError::Timeout(Duration::from_secs(40))));
        let policy = StopPolicy::FixedCap(SoftStopConfig {
            max_turns: 2,
            ..SoftStopConfig::default()
        });
        let mut h = harness(llm, never_soft_stop());
        h.orchestrator = h.orchestrator.with_policy(policy);
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        h.orchestrator
            .handle_user_message(&mut session, "one", &user())
            .await
            .unwrap();
        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "two", &user())
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Continued { fallback: false, .. }));
        assert_eq!(session.state, OnboardingState::Active);
        assert_eq!(h.events.count(EVENT_NOTICE_SYNTHESIS_FAILED), 1);

        // Past the cap: the next answer is kept and synthesis runs again
        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "three", &user())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { persisted: true, .. }));
        assert_eq!(session.conversation.answer_count(), 3);
        assert_eq!(h.llm.call_count(CallKind::Synthesis), 2);
    }

    #[tokio::test]
    async fn test_coverage_gated_stops_when_covered() {
        let llm = chatty_llm();
        llm.push_ok(CallKind::Coverage, r#"{"enoughToStop": false}"#);
        llm.push_ok(
            CallKind::Coverage,
            "```json\n{\"identity\": \"Covered\", \"enoughToStop\": true}\n```",
        );
        let mut h = harness(llm, never_soft_stop());
        h.orchestrator = h
            .orchestrator
            .with_policy(StopPolicy::CoverageGated { max_turns: 20 });
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let first = h
            .orchestrator
            .handle_user_message(&mut session, "I'm Mia", &user())
            .await
            .unwrap();
        assert!(matches!(first, TurnOutcome::Continued { .. }));

        let second = h
            .orchestrator
            .handle_user_message(&mut session, "I love trail running", &user())
            .await
            .unwrap();
        assert!(matches!(second, TurnOutcome::Completed { .. }));
        assert_eq!(h.llm.call_count(CallKind::Coverage), 2);
    }

    struct FixedSms;

    #[async_trait]
    impl SmsEcho for FixedSms {
        async fn echo(&self, _session_id: &str, _turns: &[crate::models::ConversationTurn]) -> LlmResult<String> {
            Ok("via sms".to_string())
        }
    }

    #[tokio::test]
    async fn test_sms_channel_uses_echo() {
        let mut h = harness(chatty_llm(), never_soft_stop());
        h.orchestrator = h.orchestrator.with_sms(Arc::new(FixedSms));
        let mut session = new_session(PromptMode::Standard, InputChannel::Sms);

        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "hey", &user())
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Continued { ref reply, .. } if reply == "via sms"));
        assert_eq!(h.llm.call_count(CallKind::Turn), 0);
    }

    #[tokio::test]
    async fn test_sms_without_echo_falls_back() {
        let h = harness(chatty_llm(), never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Sms);

        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "hey", &user())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Continued { fallback: true, .. }));
    }

    #[tokio::test]
    async fn test_anonymous_completion_then_persist_after_sign_in() {
        let h = harness(chatty_llm(), never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);
        session.conversation.push_user("I'm Mia");

        let outcome = h
            .orchestrator
            .finish_now(&mut session, &SessionContext::anonymous())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { persisted: false, .. }));
        assert_eq!(session.state, OnboardingState::Complete { persisted: false });

        let outcome = h.orchestrator.finish_now(&mut session, &user()).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { persisted: true, .. }));
        assert!(h.store.has_profile("user-42").await.unwrap());
        assert_eq!(h.llm.call_count(CallKind::Synthesis), 1);
    }

    #[tokio::test]
    async fn test_forced_finish_uses_fallback_profile() {
        let llm = ScriptedLlm::new().with_default(CallKind::Synthesis, "no json here");
        let h = harness(llm, never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let outcome = h.orchestrator.finish_now(&mut session, &user()).await.unwrap();
        match outcome {
            TurnOutcome::Completed { profile, .. } => assert_eq!(profile, Profile::fallback()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persist_failure_still_returns_profile() {
        let h = harness(chatty_llm(), never_soft_stop());
        h.store.fail_next_writes(10);
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let outcome = h.orchestrator.finish_now(&mut session, &user()).await.unwrap();
        match outcome {
            TurnOutcome::Completed { profile, persisted } => {
                assert_eq!(profile.name, "Mia");
                assert!(!persisted);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.state.name(), "persist_failed");
        assert_eq!(h.events.count(EVENT_NOTICE_PERSIST_FAILED), 1);
        assert!(session.profile.is_some());
    }

    #[tokio::test]
    async fn test_failed_synthesis_then_retry_closes_once() {
        let llm = ScriptedLlm::new()
            .with_default(CallKind::Turn, "Let's keep going!")
            .with_default(CallKind::Synthesis, PROFILE_REPLY);
        llm.push(CallKind::Synthesis, Err(LlmError::Timeout(Duration::from_secs(40))));
        let mut h = harness(llm, never_soft_stop());
        h.orchestrator = h.orchestrator.with_policy(capped_at(1));
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let first = h
            .orchestrator
            .handle_user_message(&mut session, "one", &user())
            .await
            .unwrap();
        assert!(matches!(first, TurnOutcome::Continued { .. }));
        assert_eq!(closing_count(&session), 0);

        let second = h
            .orchestrator
            .handle_user_message(&mut session, "two", &user())
            .await
            .unwrap();
        assert!(matches!(second, TurnOutcome::Completed { persisted: true, .. }));
        assert_eq!(closing_count(&session), 1);
        assert_eq!(
            session.conversation.messages.last().unwrap().text,
            CLOSING_MESSAGE
        );
        assert_eq!(session.conversation.user_answers, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_repeated_synthesis_failures_end_in_failed() {
        let llm = ScriptedLlm::new()
            .with_default(CallKind::Turn, "Let's keep going!")
            .failing(CallKind::Synthesis, LlmError::Timeout(Duration::from_secs(40)));
        let mut h = harness(llm, never_soft_stop());
        h.orchestrator = h.orchestrator.with_policy(capped_at(1));
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        for answer in ["one", "two"] {
            let outcome = h
                .orchestrator
                .handle_user_message(&mut session, answer, &user())
                .await
                .unwrap();
            assert!(matches!(outcome, TurnOutcome::Continued { .. }));
        }
        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "three", &user())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
        assert_eq!(session.state.name(), "failed");
        assert_eq!(session.synthesis_failures, MAX_SYNTHESIS_FAILURES);
        assert_eq!(h.events.count(EVENT_NOTICE_SYNTHESIS_FAILED), 3);
        assert_eq!(closing_count(&session), 0);

        let err = h
            .orchestrator
            .handle_user_message(&mut session, "four", &user())
            .await;
        assert!(matches!(err, Err(TransitionError::AlreadyTerminal(ref s)) if s == "failed"));
        assert_eq!(session.conversation.answer_count(), 3);

        // A forced finish still hands out the basic profile
        let outcome = h.orchestrator.finish_now(&mut session, &user()).await.unwrap();
        match outcome {
            TurnOutcome::Completed { profile, persisted } => {
                assert_eq!(profile, Profile::fallback());
                assert!(persisted);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(closing_count(&session), 1);
    }

    #[tokio::test]
    async fn test_cancelled_synthesis_does_not_wedge_the_session() {
        let h = stalling_harness();
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            h.orchestrator
                .handle_user_message(&mut session, "one", &user()),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(session.state.name(), "synthesizing");

        let outcome = h
            .orchestrator
            .handle_user_message(&mut session, "two", &user())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { persisted: true, .. }));
        assert_eq!(session.state, OnboardingState::Complete { persisted: true });
        assert_eq!(session.conversation.answer_count(), 2);
        assert_eq!(closing_count(&session), 1);
    }

    #[tokio::test]
    async fn test_finish_after_cancelled_synthesis() {
        let h = stalling_harness();
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            h.orchestrator.finish_now(&mut session, &user()),
        )
        .await;
        assert!(cancelled.is_err());

        let outcome = h.orchestrator.finish_now(&mut session, &user()).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { persisted: true, .. }));
        assert!(h.store.has_profile("user-42").await.unwrap());
        assert_eq!(closing_count(&session), 1);
    }

    #[test]
    fn test_recover_interrupted_keeps_synthesized_profile() {
        let h = harness(chatty_llm(), never_soft_stop());
        let mut session = new_session(PromptMode::Standard, InputChannel::Text);
        assert!(!h.orchestrator.recover_interrupted(&mut session).unwrap());

        session.state = OnboardingState::Synthesizing {
            reason: StopReason::Capped,
        };
        session.profile = Some(Profile::fallback());
        assert!(h.orchestrator.recover_interrupted(&mut session).unwrap());
        assert_eq!(session.state, OnboardingState::Complete { persisted: false });
    }
}
