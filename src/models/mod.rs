// Data models matching the frontend TypeScript types

pub mod connections;
pub mod conversation;
pub mod coverage;
pub mod profile;
pub mod session;
pub mod state_machine;

pub use connections::{Provider, SpotifySummary, TokenSet, YouTubeSummary};
pub use conversation::{
    Conversation, ConversationTurn, InputChannel, Message, MessageRole, PromptMode, Sender,
};
pub use coverage::CoverageReport;
pub use profile::{BigFive, Profile};
pub use session::{OnboardingSession, SessionContext, UserRecord};
pub use state_machine::{OnboardingState, StopReason, TransitionError};
