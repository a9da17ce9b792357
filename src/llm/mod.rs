//! LLM access for onboarding
//!
//! Every model call goes through the [`ChatCompletion`] trait so the
//! orchestrator, coverage evaluator and synthesizer can be driven by a real
//! provider in the server and by scripted replies in tests.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiClient;
pub use scripted::ScriptedLlm;

use crate::models::ConversationTurn;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by LLM calls
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    MissingApiKey,

    #[error("LLM authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("Failed to build prompt: {0}")]
    Prompt(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// What a call is for; selects its timeout and sampling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Next assistant turn in the conversation
    Turn,
    /// Rubric-based coverage classification (JSON)
    Coverage,
    /// Transcript to profile synthesis (JSON)
    Synthesis,
    /// Profile patch from a free-form statement (JSON)
    Mirror,
    /// Short insight text about connected provider data
    Insight,
}

impl CallKind {
    pub fn expects_json(&self) -> bool {
        matches!(
            self,
            CallKind::Coverage | CallKind::Synthesis | CallKind::Mirror
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Turn => "turn",
            CallKind::Coverage => "coverage",
            CallKind::Synthesis => "synthesis",
            CallKind::Mirror => "mirror",
            CallKind::Insight => "insight",
        }
    }
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub kind: CallKind,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn new(kind: CallKind, timeout: Duration) -> Self {
        let temperature = if kind.expects_json() { 0.2 } else { 0.8 };
        Self {
            kind,
            timeout,
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Timeouts applied to each call kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub turn: Duration,
    pub coverage: Duration,
    pub synthesis: Duration,
    pub mirror: Duration,
    pub insight: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            turn: Duration::from_secs(30),
            coverage: Duration::from_secs(20),
            synthesis: Duration::from_secs(40),
            mirror: Duration::from_secs(30),
            insight: Duration::from_secs(20),
        }
    }
}

impl CallTimeouts {
    pub fn options(&self, kind: CallKind) -> CompletionOptions {
        let timeout = match kind {
            CallKind::Turn => self.turn,
            CallKind::Coverage => self.coverage,
            CallKind::Synthesis => self.synthesis,
            CallKind::Mirror => self.mirror,
            CallKind::Insight => self.insight,
        };
        CompletionOptions::new(kind, timeout)
    }
}

/// A text-completion service consumed as a black box.
///
/// Replies are free text; JSON callers must extract defensively.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Complete the given turns and return the raw reply text
    async fn complete(
        &self,
        turns: &[ConversationTurn],
        options: &CompletionOptions,
    ) -> LlmResult<String>;
}

/// Map an HTTP error status to an [`LlmError`]
pub fn parse_http_error(status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthenticationFailed(body.to_string()),
        429 => LlmError::RateLimited(body.to_string()),
        500..=599 => LlmError::ServerError {
            status,
            message: body.to_string(),
        },
        _ => LlmError::Request(format!("HTTP {}: {}", status, body)),
    }
}
