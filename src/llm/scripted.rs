//! Scripted completion provider
//!
//! Replies are queued per call kind and handed out in order; when a queue is
//! empty the kind's default reply is used. Every call is recorded so tests can
//! assert how often each kind was invoked and with which turns.

use super::{CallKind, ChatCompletion, CompletionOptions, LlmError, LlmResult};
use crate::models::ConversationTurn;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One recorded call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Default)]
pub struct ScriptedLlm {
    queued: Mutex<HashMap<CallKind, VecDeque<LlmResult<String>>>>,
    defaults: Mutex<HashMap<CallKind, LlmResult<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply used whenever no queued reply is left for `kind`
    pub fn with_default(self, kind: CallKind, reply: impl Into<String>) -> Self {
        if let Ok(mut defaults) = self.defaults.lock() {
            defaults.insert(kind, Ok(reply.into()));
        }
        self
    }

    /// Make every unqueued call of `kind` fail
    pub fn failing(self, kind: CallKind, error: LlmError) -> Self {
        if let Ok(mut defaults) = self.defaults.lock() {
            defaults.insert(kind, Err(error));
        }
        self
    }

    /// Queue one reply for the next call of `kind`
    pub fn push(&self, kind: CallKind, reply: LlmResult<String>) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.entry(kind).or_default().push_back(reply);
        }
    }

    pub fn push_ok(&self, kind: CallKind, reply: impl Into<String>) {
        self.push(kind, Ok(reply.into()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    fn next_reply(&self, kind: CallKind) -> LlmResult<String> {
        let queued = self
            .queued
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&kind).and_then(|replies| replies.pop_front()));
        if let Some(reply) = queued {
            return reply;
        }

        self.defaults
            .lock()
            .ok()
            .and_then(|d| d.get(&kind).cloned())
            .unwrap_or_else(|| {
                Err(LlmError::Request(format!(
                    "no scripted reply for {} call",
                    kind.as_str()
                )))
            })
    }
}

#[async_trait]
impl ChatCompletion for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        turns: &[ConversationTurn],
        options: &CompletionOptions,
    ) -> LlmResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind: options.kind,
                turns: turns.to_vec(),
            });
        }
        self.next_reply(options.kind)
    }
}
