// Onboarding state machine with validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an onboarding conversation stopped asking questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The hard turn cap was reached
    Capped,
    /// The probabilistic pacing check fired
    SoftStop,
    /// The coverage evaluator judged the transcript complete
    Covered,
    /// The user or client asked to finish early
    Requested,
}

/// Lifecycle of one onboarding session.
///
/// `Active` is the only re-entrant state. `Synthesizing` either completes or
/// falls back to `Active` when synthesis fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OnboardingState {
    Active,
    Synthesizing { reason: StopReason },
    Complete { persisted: bool },
    Failed { reason: String },
}

impl Default for OnboardingState {
    fn default() -> Self {
        OnboardingState::Active
    }
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Invalid onboarding transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Onboarding already finished ({0})")]
    AlreadyTerminal(String),
}

impl OnboardingState {
    pub fn name(&self) -> &'static str {
        match self {
            OnboardingState::Active => "active",
            OnboardingState::Synthesizing { .. } => "synthesizing",
            OnboardingState::Complete { persisted: true } => "persisted",
            OnboardingState::Complete { persisted: false } => "persist_failed",
            OnboardingState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OnboardingState::Complete { .. } | OnboardingState::Failed { .. }
        )
    }

    pub fn accepts_input(&self) -> bool {
        matches!(self, OnboardingState::Active)
    }

    /// A prompt-mode switch may start the conversation over from here
    pub fn can_restart(&self) -> bool {
        matches!(self, OnboardingState::Active | OnboardingState::Failed { .. })
    }
}

/// Validates if a session can move from one state to another
pub fn can_transition(from: &OnboardingState, to: &OnboardingState) -> bool {
    use OnboardingState::*;
    match (from, to) {
        (Active, Synthesizing { .. }) => true,

        (Synthesizing { .. }, Complete { .. }) => true,
        // Synthesis failed: resume the conversation
        (Synthesizing { .. }, Active) => true,
        (Synthesizing { .. }, Failed { .. }) => true,

        // Synthesis gave up: a forced finish still hands out a profile
        (Failed { .. }, Synthesizing { .. }) => true,

        // A failed persist can be retried without re-synthesizing
        (Complete { persisted: false }, Complete { .. }) => true,

        (Active, Active) => true,

        _ => false,
    }
}

/// Validates and performs a state transition
pub fn transition_state(
    current: &OnboardingState,
    target: OnboardingState,
) -> Result<OnboardingState, TransitionError> {
    if current.is_terminal() && !can_transition(current, &target) {
        return Err(TransitionError::AlreadyTerminal(current.name().to_string()));
    }

    if !can_transition(current, &target) {
        return Err(TransitionError::InvalidTransition {
            from: current.name().to_string(),
            to: target.name().to_string(),
        });
    }

    Ok(target)
}
